//! ISO-TP (ISO 15765-2) framing over classic CAN
//!
//! Protocol control information lives in the high nibble of byte 0:
//!
//! | nibble | frame             | layout                                   |
//! |--------|-------------------|------------------------------------------|
//! | 0      | single frame      | `0L` + L data bytes (L = 1..=7)          |
//! | 1      | first frame       | `1H LL` (12-bit total length) + 6 bytes  |
//! | 2      | consecutive frame | `2S` (sequence 1..=15, then 1) + 7 bytes |
//! | 3      | flow control      | `3F BS ST`                               |

pub mod error;
mod transport;

pub use error::TransportError;
pub use transport::IsoTpTransport;

use serde::{Deserialize, Serialize};

use crate::driver::MAX_FRAME_DATA;

/// Largest message a 12-bit first-frame length can describe
pub const MAX_MESSAGE_LEN: usize = 4095;
/// Largest single-frame payload
pub const MAX_SINGLE_FRAME_LEN: usize = 7;
/// Data bytes carried by a first frame
pub const FIRST_FRAME_DATA: usize = 6;
/// Data bytes carried by a consecutive frame
pub const CONSECUTIVE_FRAME_DATA: usize = 7;

/// Flow status: continue to send
pub const FLOW_CONTINUE: u8 = 0x00;

/// Protocol control information of one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsoTpPci {
    SingleFrame { len: u8 },
    FirstFrame { total_len: u16 },
    ConsecutiveFrame { seq: u8 },
    FlowControl {
        flow_status: u8,
        block_size: u8,
        separation_time: u8,
    },
}

impl IsoTpPci {
    /// Decode the PCI of a frame payload. Returns `None` for an empty frame,
    /// an unknown frame type, or a header truncated by the frame length.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let b0 = *data.first()?;
        match b0 >> 4 {
            0x0 => Some(Self::SingleFrame { len: b0 & 0x0F }),
            0x1 => {
                let lo = *data.get(1)?;
                Some(Self::FirstFrame {
                    total_len: (u16::from(b0 & 0x0F) << 8) | u16::from(lo),
                })
            }
            0x2 => Some(Self::ConsecutiveFrame { seq: b0 & 0x0F }),
            0x3 => Some(Self::FlowControl {
                flow_status: b0 & 0x0F,
                block_size: data.get(1).copied().unwrap_or(0),
                separation_time: data.get(2).copied().unwrap_or(0),
            }),
            _ => None,
        }
    }
}

/// What the receiver does with a consecutive frame whose sequence number
/// is not the expected one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SequenceErrorPolicy {
    /// Discard the frame and keep waiting for the expected one
    #[default]
    Ignore,
    /// Fail the exchange immediately
    Abort,
}

/// Sequence number that follows `seq` (1..=15, then back to 1)
pub fn next_sequence(seq: u8) -> u8 {
    if seq >= 15 {
        1
    } else {
        seq + 1
    }
}

fn pad(mut frame: Vec<u8>, padding: u8) -> Vec<u8> {
    frame.resize(MAX_FRAME_DATA, padding);
    frame
}

/// Single frame carrying `payload` (1..=7 bytes), padded to 8 bytes
pub fn single_frame(payload: &[u8], padding: u8) -> Vec<u8> {
    debug_assert!(payload.len() <= MAX_SINGLE_FRAME_LEN);
    let mut frame = Vec::with_capacity(MAX_FRAME_DATA);
    frame.push(payload.len() as u8);
    frame.extend_from_slice(payload);
    pad(frame, padding)
}

/// Flow control: continue to send, no block limit, no separation time
pub fn flow_control_frame(padding: u8) -> Vec<u8> {
    pad(vec![0x30 | FLOW_CONTINUE, 0x00, 0x00], padding)
}

/// Split a message into ISO-TP frame payloads, each padded to 8 bytes.
///
/// Messages of up to 7 bytes become one single frame; longer ones a first
/// frame followed by consecutive frames numbered 1..=15, 1, 2, ...
pub fn segment(message: &[u8], padding: u8) -> Result<Vec<Vec<u8>>, TransportError> {
    if message.is_empty() || message.len() > MAX_MESSAGE_LEN {
        return Err(TransportError::InvalidRequest(format!(
            "message length {} outside 1..={}",
            message.len(),
            MAX_MESSAGE_LEN
        )));
    }

    if message.len() <= MAX_SINGLE_FRAME_LEN {
        return Ok(vec![single_frame(message, padding)]);
    }

    let total = message.len();
    let mut frames = Vec::with_capacity(1 + (total - FIRST_FRAME_DATA).div_ceil(CONSECUTIVE_FRAME_DATA));

    let mut first = vec![0x10 | ((total >> 8) as u8 & 0x0F), (total & 0xFF) as u8];
    first.extend_from_slice(&message[..FIRST_FRAME_DATA]);
    frames.push(first);

    let mut seq = 1u8;
    for chunk in message[FIRST_FRAME_DATA..].chunks(CONSECUTIVE_FRAME_DATA) {
        let mut frame = Vec::with_capacity(MAX_FRAME_DATA);
        frame.push(0x20 | seq);
        frame.extend_from_slice(chunk);
        frames.push(pad(frame, padding));
        seq = next_sequence(seq);
    }

    Ok(frames)
}
