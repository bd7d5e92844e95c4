//! OBD-II service codec
//!
//! Builds service requests and decodes their responses: supported-PID
//! bitmaps (service 0x01), stored trouble codes (0x03), the VIN (0x09) and
//! named PIDs through a [`PidRegistry`].

pub mod client;
pub mod dtc;
pub mod error;
pub mod pid;
pub mod supported;

pub use client::ObdClient;
pub use dtc::{DtcCode, DtcParseError, Vin, VIN_LEN};
pub use error::ObdError;
pub use pid::{DecodeRule, PidEntry, PidRegistry, PidValue};

/// Show current data
pub const SERVICE_CURRENT_DATA: u8 = 0x01;
/// Show freeze frame data
pub const SERVICE_FREEZE_FRAME: u8 = 0x02;
/// Show stored diagnostic trouble codes
pub const SERVICE_READ_DTC: u8 = 0x03;
/// Request vehicle information
pub const SERVICE_VEHICLE_INFO: u8 = 0x09;

/// Vehicle information PID carrying the VIN
pub const PID_VIN: u8 = 0x02;
