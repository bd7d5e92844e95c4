//! obd-can - OBD-II diagnostics over CAN
//!
//! This crate provides the client side of OBD-II communication over a CAN
//! bus, plus the building blocks a simulated ECU needs to answer it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        ObdClient                            │
//! │  supported PIDs / DTCs / VIN / named PIDs                   │
//! │                                                             │
//! │  ┌─────────────┐                    ┌─────────────────────┐ │
//! │  │ PidRegistry │                    │ DtcCode / Vin       │ │
//! │  │ (decode)    │                    │ (decode)            │ │
//! │  └─────────────┘                    └─────────────────────┘ │
//! │                          │                                  │
//! │                   ┌──────┴───────┐                          │
//! │                   │IsoTpTransport│                          │
//! │                   │(SF/FF/CF/FC) │                          │
//! │                   └──────┬───────┘                          │
//! │                          │                                  │
//! │          ┌───────────────┴──────────────┐                   │
//! │          │AddressingConfig  │ CanDriver │                   │
//! │          │(filtering)       │(SocketCAN)│                   │
//! │          └──────────────────────────────┘                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod addressing;
pub mod clock;
pub mod config;
pub mod driver;
pub mod isotp;
pub mod obd;

pub use addressing::{AddressingConfig, AddressingMode};
pub use clock::{Clock, MonotonicClock, Ticks};
pub use config::{ConfigError, DriverConfig, ObdConfig, TransportOptions};
pub use driver::{create_driver, CanDriver, CanFrame, DriverError, VirtualBus};
pub use isotp::{IsoTpPci, IsoTpTransport, SequenceErrorPolicy, TransportError};
pub use obd::{DecodeRule, DtcCode, ObdClient, ObdError, PidEntry, PidRegistry, PidValue, Vin};
