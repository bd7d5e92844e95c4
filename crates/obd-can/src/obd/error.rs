//! OBD codec errors

use thiserror::Error;

use crate::isotp::TransportError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ObdError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("PID '{0}' is not in the registry")]
    UnsupportedPid(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Failed to decode PID '{pid}': {reason}")]
    Decode { pid: String, reason: String },
}
