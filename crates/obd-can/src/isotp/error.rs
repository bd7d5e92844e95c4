//! ISO-TP transport errors

use std::time::Duration;

use thiserror::Error;

use crate::driver::DriverError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Send failed after {attempts} attempt(s): {source}")]
    SendFailed {
        attempts: usize,
        #[source]
        source: DriverError,
    },

    #[error("No response within {0:?}")]
    Timeout(Duration),

    #[error("Consecutive frame out of sequence: expected {expected}, got {got}")]
    SequenceMismatch { expected: u8, got: u8 },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}
