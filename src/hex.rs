//! ASCII hex digit codec for 4-bit signal values.
//!
//! The channel layer stores one hex digit per mapped byte so the
//! backing files stay readable in any editor and writable from any
//! language. Decoding is forgiving: case-insensitive, and any byte that
//! is not a hex digit reads as zero.

/// Encode the low 4 bits of `value` as a lowercase ASCII hex digit.
#[must_use]
pub fn nybble_to_hex(value: u8) -> u8 {
    match value & 0x0f {
        n @ 0..=9 => b'0' + n,
        n => b'a' + (n - 10),
    }
}

/// Decode one ASCII hex digit; anything else is 0.
#[must_use]
pub fn hex_to_nybble(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        b'A'..=b'F' => digit - b'A' + 10,
        _ => 0,
    }
}

/// Render a packed word as 16 hex digits, most significant first.
#[must_use]
pub fn word_to_hex(word: u64) -> String {
    format!("{word:016x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nybble_round_trip() {
        for value in 0..=0x0f {
            assert_eq!(hex_to_nybble(nybble_to_hex(value)), value);
        }
    }

    #[test]
    fn test_encode_masks_high_bits() {
        assert_eq!(nybble_to_hex(0x1f), b'f');
        assert_eq!(nybble_to_hex(0xa0), b'0');
    }

    #[test]
    fn test_decode_is_case_insensitive() {
        assert_eq!(hex_to_nybble(b'A'), 10);
        assert_eq!(hex_to_nybble(b'a'), 10);
        assert_eq!(hex_to_nybble(b'F'), 15);
        assert_eq!(hex_to_nybble(b'f'), 15);
    }

    #[test]
    fn test_decode_junk_as_zero() {
        for junk in [b' ', b'g', b'z', b'\0', 0xff] {
            assert_eq!(hex_to_nybble(junk), 0);
        }
    }

    #[test]
    fn test_word_rendering() {
        assert_eq!(word_to_hex(0), "0000000000000000");
        assert_eq!(word_to_hex(0xdead_beef), "00000000deadbeef");
        assert_eq!(word_to_hex(u64::MAX), "ffffffffffffffff");
    }
}
