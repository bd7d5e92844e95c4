//! OBD-II CAN identifier addressing and software acceptance filtering
//!
//! Hardware acceptance filters are not trusted; every received frame is
//! re-validated against the session's response identifier range.

use serde::{Deserialize, Serialize};

use crate::driver::CanFrame;

/// Functional request ID, 11-bit (OBD-II broadcast)
pub const FUNCTIONAL_ID_11BIT: u32 = 0x7DF;
/// Functional request ID, 29-bit (all ECUs, tester address F1)
pub const FUNCTIONAL_ID_29BIT: u32 = 0x18DB33F1;

/// Identifier width used on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressingMode {
    /// 11-bit identifiers
    #[default]
    Standard,
    /// 29-bit identifiers
    Extended,
}

/// Immutable per-session addressing configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressingConfig {
    /// Whether frames use 29-bit identifiers
    pub extended: bool,
    /// Identifier for outbound requests
    pub request_id: u32,
    /// Lowest accepted response identifier (inclusive)
    pub response_id_low: u32,
    /// Highest accepted response identifier (inclusive)
    pub response_id_high: u32,
    /// Mask form of the response range
    pub filter_mask: u32,
}

impl AddressingConfig {
    /// 11-bit addressing: requests on 0x7DF, responses on 0x7E8..=0x7EF
    pub const fn standard() -> Self {
        Self {
            extended: false,
            request_id: FUNCTIONAL_ID_11BIT,
            response_id_low: 0x7E8,
            response_id_high: 0x7EF,
            filter_mask: 0x7F8,
        }
    }

    /// 29-bit addressing: requests on 0x18DB33F1, responses on 0x18DAF110..=0x18DAF11F
    pub const fn extended() -> Self {
        Self {
            extended: true,
            request_id: FUNCTIONAL_ID_29BIT,
            response_id_low: 0x18DAF110,
            response_id_high: 0x18DAF11F,
            filter_mask: 0x1FFFFFF0,
        }
    }

    pub const fn for_mode(mode: AddressingMode) -> Self {
        match mode {
            AddressingMode::Standard => Self::standard(),
            AddressingMode::Extended => Self::extended(),
        }
    }

    pub fn mode(&self) -> AddressingMode {
        if self.extended {
            AddressingMode::Extended
        } else {
            AddressingMode::Standard
        }
    }

    /// Identifier used for outbound request frames
    pub fn request_id(&self) -> u32 {
        self.request_id
    }

    /// Software acceptance filter for response frames.
    ///
    /// A frame is accepted iff its extended flag matches the session, it is
    /// not a remote frame, and its identifier lies in the inclusive range
    /// `response_id_low..=response_id_high`.
    pub fn accepts(&self, frame: &CanFrame) -> bool {
        frame.extended == self.extended
            && !frame.remote
            && (self.response_id_low..=self.response_id_high).contains(&frame.id)
    }

    /// Whether a frame is an OBD-II request addressed to this session (ECU side)
    pub fn is_request(&self, frame: &CanFrame) -> bool {
        frame.extended == self.extended && !frame.remote && frame.id == self.request_id
    }

    /// Mask comparison equivalent to a hardware filter programmed with
    /// `(response_id_low, filter_mask)`.
    pub fn matches_filter(&self, id: u32) -> bool {
        id & self.filter_mask == self.response_id_low & self.filter_mask
    }
}

impl From<AddressingMode> for AddressingConfig {
    fn from(mode: AddressingMode) -> Self {
        Self::for_mode(mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: u32, extended: bool, remote: bool) -> CanFrame {
        CanFrame {
            id,
            extended,
            remote,
            data: vec![0x03, 0x41, 0x0D, 0x32],
        }
    }

    #[test]
    fn test_standard_accepts_whole_response_range() {
        let cfg = AddressingConfig::standard();
        for id in 0x7E8..=0x7EF {
            assert!(cfg.accepts(&frame(id, false, false)), "id 0x{:X}", id);
        }
        assert!(!cfg.accepts(&frame(0x7E7, false, false)));
        assert!(!cfg.accepts(&frame(0x7F0, false, false)));
        assert!(!cfg.accepts(&frame(0x7DF, false, false)));
    }

    #[test]
    fn test_extended_accepts_whole_response_range() {
        let cfg = AddressingConfig::extended();
        assert!(cfg.accepts(&frame(0x18DAF110, true, false)));
        assert!(cfg.accepts(&frame(0x18DAF11F, true, false)));
        assert!(!cfg.accepts(&frame(0x18DAF120, true, false)));
        assert!(!cfg.accepts(&frame(0x18DAF10F, true, false)));
    }

    #[test]
    fn test_rejects_flag_mismatch_and_remote() {
        let std_cfg = AddressingConfig::standard();
        assert!(!std_cfg.accepts(&frame(0x7E8, true, false)));
        assert!(!std_cfg.accepts(&frame(0x7E8, false, true)));

        let ext_cfg = AddressingConfig::extended();
        assert!(!ext_cfg.accepts(&frame(0x18DAF111, false, false)));
        assert!(!ext_cfg.accepts(&frame(0x18DAF111, true, true)));
    }

    #[test]
    fn test_mask_agrees_with_range_on_canonical_configs() {
        for cfg in [AddressingConfig::standard(), AddressingConfig::extended()] {
            let span = cfg.response_id_high - cfg.response_id_low;
            let lo = cfg.response_id_low.saturating_sub(span + 1);
            for id in lo..=cfg.response_id_high + span + 1 {
                let by_range = cfg.accepts(&frame(id, cfg.extended, false));
                assert_eq!(by_range, cfg.matches_filter(id), "id 0x{:X}", id);
            }
        }
    }

    #[test]
    fn test_is_request() {
        let cfg = AddressingConfig::extended();
        assert!(cfg.is_request(&frame(0x18DB33F1, true, false)));
        assert!(!cfg.is_request(&frame(0x18DB33F1, false, false)));
        assert!(!cfg.is_request(&frame(0x18DB33F1, true, true)));
        assert!(!cfg.is_request(&frame(0x7DF, true, false)));
    }

    #[test]
    fn test_mode_round_trip() {
        assert_eq!(AddressingConfig::from(AddressingMode::Extended).mode(), AddressingMode::Extended);
        assert_eq!(AddressingConfig::from(AddressingMode::Standard).mode(), AddressingMode::Standard);
    }
}
