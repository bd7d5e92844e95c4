//! ecu-sim - simulated OBD-II ECU
//!
//! Answers service 0x01 requests for supported-PID bitmaps and a handful of
//! live values, and optionally service 0x03 (stored DTCs) and service 0x09
//! PID 0x02 (VIN) from configuration.
//!
//! # Modules
//!
//! - [`config`] - Simulator configuration (TOML)
//! - [`simulator`] - Request validation, dispatch and response framing
//! - [`values`] - Random live-data synthesis

pub mod config;
pub mod simulator;
pub mod values;

pub use config::EcuConfig;
pub use simulator::{EcuSimulator, PollOutcome};
pub use values::ValueGenerator;
