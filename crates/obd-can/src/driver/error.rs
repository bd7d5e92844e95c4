//! CAN driver errors

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("Failed to open CAN interface: {0}")]
    Open(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Receive failed: {0}")]
    Receive(String),

    #[error("Driver not supported: {0}")]
    Unsupported(String),
}
