//! Command implementations for obd-cli

pub mod dtcs;
pub mod pids;
pub mod read;
pub mod vin;

pub use dtcs::dtcs;
pub use pids::pids;
pub use read::{list, read};
pub use vin::vin;

use obd_can::{CanDriver, ObdClient};

/// Client over whichever driver the configuration selected
pub type Client = ObdClient<Box<dyn CanDriver>>;
