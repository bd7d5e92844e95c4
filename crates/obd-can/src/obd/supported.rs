//! Supported-PID bitmaps (service 0x01, PIDs 0x00, 0x20, 0x40, ...)
//!
//! Each block answer is a big-endian 32-bit mask. Bit `31 - i` set means
//! PID `base + i + 1` is supported; bit 0 is PID `base + 0x20`, the next
//! block request, so it doubles as "more blocks follow".

/// PIDs covered by one bitmap
pub const BLOCK_SIZE: u8 = 0x20;

/// Whether `pid` requests a supported-PID bitmap.
/// Bitmap PIDs run 0x00, 0x20, ... up to 0xA0.
pub fn is_bitmap_pid(pid: u8) -> bool {
    pid % BLOCK_SIZE == 0 && pid < 0xC0
}

/// PIDs flagged in the bitmap for block `base`
pub fn decode_bitmap(base: u8, mask: u32) -> Vec<u8> {
    (0..32u16)
        .filter(|i| mask & (1 << (31 - i)) != 0)
        .filter_map(|i| u8::try_from(u16::from(base) + i + 1).ok())
        .collect()
}

/// Whether another block should be requested after this one
pub fn has_next_block(mask: u32) -> bool {
    mask & 1 != 0
}

/// Bitmap for block `base` advertising `supported`.
///
/// Bit 0 is set iff some supported PID lies beyond `base + 0x20`.
pub fn encode_bitmap(base: u8, supported: &[u8]) -> u32 {
    let base = u16::from(base);
    let mut mask = 0u32;
    for &pid in supported {
        let pid = u16::from(pid);
        if pid > base && pid < base + u16::from(BLOCK_SIZE) {
            mask |= 1 << (31 - (pid - base - 1));
        }
    }
    if supported.iter().any(|&pid| u16::from(pid) > base + u16::from(BLOCK_SIZE)) {
        mask |= 1;
    }
    mask
}

/// Parse the mask from the data bytes following service id and PID echo
pub fn parse_mask(data: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = data.get(..4)?.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_all_bits_set() {
        assert_eq!(decode_bitmap(0x00, 0xFFFF_FFFF), (1..=32).collect::<Vec<u8>>());
        assert!(has_next_block(0xFFFF_FFFF));
    }

    #[test]
    fn test_last_block_does_not_overflow() {
        let pids = decode_bitmap(0xE0, 0xFFFF_FFFF);
        assert_eq!(pids.len(), 31);
        assert_eq!(pids.last(), Some(&0xFF));
    }

    #[test]
    fn test_known_mask() {
        // 0xBE1FA813: a typical first block
        let pids = decode_bitmap(0x00, 0xBE1F_A813);
        assert_eq!(
            pids,
            vec![0x01, 0x03, 0x04, 0x05, 0x06, 0x07, 0x0C, 0x0D, 0x0E, 0x0F, 0x10, 0x11, 0x13, 0x15, 0x1C, 0x1F, 0x20]
        );
    }

    #[test]
    fn test_encode_sets_continuation_bit() {
        let mask = encode_bitmap(0x00, &[0x0C, 0x0D, 0x42]);
        assert_eq!(mask, (1 << (31 - 11)) | (1 << (31 - 12)) | 1);
        assert!(!has_next_block(encode_bitmap(0x40, &[0x0C, 0x0D, 0x42])));
    }

    #[test]
    fn test_bitmap_pids() {
        assert!(is_bitmap_pid(0x00));
        assert!(is_bitmap_pid(0xA0));
        assert!(!is_bitmap_pid(0xC0));
        assert!(!is_bitmap_pid(0x0C));
    }

    #[test]
    fn test_parse_mask() {
        assert_eq!(parse_mask(&[0xBE, 0x1F, 0xA8, 0x13, 0xAA]), Some(0xBE1F_A813));
        assert_eq!(parse_mask(&[0xBE, 0x1F]), None);
    }

    proptest! {
        #[test]
        fn prop_encode_decode_agree(supported in proptest::collection::btree_set(1u8..=0xBF, 0..40), block in 0u8..6) {
            let base = block * BLOCK_SIZE;
            let supported: Vec<u8> = supported.into_iter().collect();
            let decoded = decode_bitmap(base, encode_bitmap(base, &supported));

            // Everything in (base, base + 0x20) round-trips exactly
            let expected: Vec<u8> = supported
                .iter()
                .copied()
                .filter(|&p| p > base && u16::from(p) < u16::from(base) + 0x20)
                .collect();
            let inner: Vec<u8> = decoded
                .iter()
                .copied()
                .filter(|&p| u16::from(p) < u16::from(base) + 0x20)
                .collect();
            prop_assert_eq!(inner, expected);
        }
    }
}
