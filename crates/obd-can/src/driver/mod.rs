//! CAN driver boundary
//!
//! This module provides the raw-frame primitives the transport and the
//! simulator are built on:
//! - SocketCAN driver for raw CAN (Linux only)
//! - Virtual in-memory bus connecting several endpoints in one process
//! - Mock driver with a scripted responder for testing
//!
//! # Example
//!
//! ```ignore
//! use obd_can::driver::{create_driver, VirtualBus};
//! use obd_can::config::DriverConfig;
//!
//! let bus = VirtualBus::new();
//! let driver = create_driver(&DriverConfig::Virtual, &bus)?;
//! ```

pub mod error;
pub mod mock;
pub mod virtual_bus;

#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub mod socketcan;

pub use error::DriverError;
pub use mock::MockCanDriver;
pub use virtual_bus::{VirtualBus, VirtualCanDriver};

use crate::config::DriverConfig;

/// Maximum payload of a classic CAN frame
pub const MAX_FRAME_DATA: usize = 8;

/// A raw classic CAN frame as seen at the driver boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanFrame {
    /// Identifier (11 or 29 significant bits)
    pub id: u32,
    /// 29-bit identifier flag
    pub extended: bool,
    /// Remote transmission request flag
    pub remote: bool,
    /// Payload, 0-8 bytes
    pub data: Vec<u8>,
}

impl CanFrame {
    /// Build a data frame
    pub fn new(id: u32, extended: bool, data: &[u8]) -> Self {
        Self {
            id,
            extended,
            remote: false,
            data: data.to_vec(),
        }
    }
}

/// Non-blocking access to a CAN controller.
///
/// Implementations never filter on identifier reliably enough to be trusted;
/// callers re-validate every frame in software.
pub trait CanDriver: Send {
    /// Whether at least one received frame is queued
    fn any(&mut self) -> bool;

    /// Take the next queued frame, if any. A frame is either returned whole
    /// or left in the queue.
    fn recv(&mut self) -> Result<Option<CanFrame>, DriverError>;

    /// Transmit a frame
    fn send(&mut self, frame: &CanFrame) -> Result<(), DriverError>;

    /// Discard every queued received frame
    fn clear_rx_queue(&mut self);
}

impl<D: CanDriver + ?Sized> CanDriver for Box<D> {
    fn any(&mut self) -> bool {
        (**self).any()
    }

    fn recv(&mut self) -> Result<Option<CanFrame>, DriverError> {
        (**self).recv()
    }

    fn send(&mut self, frame: &CanFrame) -> Result<(), DriverError> {
        (**self).send(frame)
    }

    fn clear_rx_queue(&mut self) {
        (**self).clear_rx_queue()
    }
}

/// Create a driver based on configuration
///
/// `bus` is the in-process bus that [`DriverConfig::Virtual`] attaches to.
pub fn create_driver(
    config: &DriverConfig,
    bus: &VirtualBus,
) -> Result<Box<dyn CanDriver>, DriverError> {
    match config {
        #[cfg(all(target_os = "linux", feature = "socketcan"))]
        DriverConfig::SocketCan(cfg) => {
            let driver = socketcan::SocketCanDriver::open(&cfg.interface)?;
            Ok(Box::new(driver))
        }
        #[cfg(not(all(target_os = "linux", feature = "socketcan")))]
        DriverConfig::SocketCan(_) => Err(DriverError::Unsupported(
            "SocketCAN requires Linux and the 'socketcan' feature".to_string(),
        )),
        DriverConfig::Virtual => Ok(Box::new(bus.endpoint())),
    }
}
