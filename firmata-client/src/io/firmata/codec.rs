//! 7-bit encoding shared by every multi-byte field of the protocol.
//!
//! Bytes with the high bit set are reserved for framing (command bytes), so payload values are
//! split in groups of 7 bits, least significant group first. None of these functions can fail:
//! bits which do not fit are masked away.

use crate::io::firmata::constants::SEVEN_BIT_MASK;

/// Combines two 7-bit groups into one byte: `(low & 0x7F) | ((high & 0x7F) << 7)`.
///
/// Only the lowest bit of `high` survives: the result is truncated to 8 bits.
pub fn decode_byte(low: u8, high: u8) -> u8 {
    (low & SEVEN_BIT_MASK) | ((high & SEVEN_BIT_MASK) << 7)
}

/// Splits a byte in two 7-bit groups.
pub fn encode_byte(value: u8) -> [u8; 2] {
    [value & SEVEN_BIT_MASK, (value >> 7) & SEVEN_BIT_MASK]
}

/// Combines two 7-bit groups into a 14-bit value (0..=16383).
pub fn decode_u14(low: u8, high: u8) -> u16 {
    u16::from(low & SEVEN_BIT_MASK) | (u16::from(high & SEVEN_BIT_MASK) << 7)
}

/// Splits the lowest 14 bits of `value` in two 7-bit groups.
pub fn encode_u14(value: u16) -> [u8; 2] {
    [value as u8 & SEVEN_BIT_MASK, (value >> 7) as u8 & SEVEN_BIT_MASK]
}

/// Splits the lowest 21 bits of `value` in three 7-bit groups (baud rates, buffer sizes).
pub fn encode_u21(value: u32) -> [u8; 3] {
    [
        value as u8 & SEVEN_BIT_MASK,
        (value >> 7) as u8 & SEVEN_BIT_MASK,
        (value >> 14) as u8 & SEVEN_BIT_MASK,
    ]
}

/// Combines three 7-bit groups into a 21-bit value.
pub fn decode_u21(bytes: [u8; 3]) -> u32 {
    bytes
        .iter()
        .rev()
        .fold(0, |value, &byte| (value << 7) | u32::from(byte & SEVEN_BIT_MASK))
}

/// Decodes a sequence of 7-bit pairs into bytes. A dangling last byte is ignored.
pub fn decode_bytes(payload: &[u8]) -> Vec<u8> {
    payload
        .chunks_exact(2)
        .map(|pair| decode_byte(pair[0], pair[1]))
        .collect()
}

/// Encodes every byte of `data` as a 7-bit pair.
pub fn encode_bytes(data: &[u8]) -> Vec<u8> {
    data.iter().flat_map(|&byte| encode_byte(byte)).collect()
}

/// Decodes a string sent by the board: each character is carried by a 7-bit pair.
///
/// A payload of odd length is padded with a zero byte (firmware padding), trailing NUL
/// characters are dropped.
///
/// # Notes
/// Unlike [`decode_byte`], which keeps 8 bits per pair, each pair is read as a 14-bit code point
/// (the STRING_DATA layout): `[0x41, 0x02]` is `'Ł'` (U+0141), not `'A'`. This is lossy and is
/// not UTF-8: only characters up to `U+3FFF` can go through.
pub fn decode_multibyte_string(payload: &[u8]) -> String {
    let mut padded = payload.to_vec();
    if padded.len() % 2 != 0 {
        padded.push(0);
    }
    padded
        .chunks_exact(2)
        .filter_map(|pair| char::from_u32(u32::from(decode_u14(pair[0], pair[1]))))
        .collect::<String>()
        .trim_end_matches('\0')
        .to_string()
}

/// Encodes a string as 7-bit pairs, one per character.
///
/// # Notes
/// Characters above `U+3FFF` are truncated to their lowest 14 bits.
pub fn encode_multibyte_string(text: &str) -> Vec<u8> {
    text.chars()
        .flat_map(|character| encode_u14((u32::from(character) & 0x3FFF) as u16))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_round_trip() {
        for value in 0..=u8::MAX {
            let [low, high] = encode_byte(value);
            assert!(low < 0x80 && high < 0x80);
            assert_eq!(decode_byte(low, high), value);
        }
    }

    #[test]
    fn test_decode_masks_high_bits() {
        assert_eq!(decode_byte(0xFF, 0x00), 0x7F);
        assert_eq!(decode_byte(0x00, 0x01), 0x80);
        // Only one bit of the high group fits in a byte.
        assert_eq!(decode_byte(0x2A, 0x03), 0xAA);
        assert_eq!(decode_u14(0x7F, 0x7F), 0x3FFF);
        assert_eq!(decode_u14(0xFF, 0xFF), 0x3FFF);
    }

    #[test]
    fn test_u14() {
        assert_eq!(encode_u14(170), [0x2A, 0x01]);
        assert_eq!(encode_u14(1023), [0x7F, 0x07]);
        assert_eq!(decode_u14(0x7F, 0x07), 1023);
        assert_eq!(encode_u14(0xFFFF), [0x7F, 0x7F]);
    }

    #[test]
    fn test_u21_round_trip() {
        for value in (0..(1 << 21)).step_by(97).chain([0x1F_FFFF]) {
            assert_eq!(decode_u21(encode_u21(value)), value);
        }
        assert_eq!(encode_u21(57_600), [0x00, 0x42, 0x03]);
        assert_eq!(encode_u21(1024), [0x00, 0x08, 0x00]);
    }

    #[test]
    fn test_bytes() {
        assert_eq!(encode_bytes(&[0x01, 0xFF]), vec![0x01, 0x00, 0x7F, 0x01]);
        assert_eq!(decode_bytes(&[0x01, 0x00, 0x7F, 0x01]), vec![0x01, 0xFF]);
        assert_eq!(decode_bytes(&[0x01, 0x00, 0x7F]), vec![0x01]);
    }

    #[test]
    fn test_multibyte_string() {
        let encoded = encode_multibyte_string("Firmata");
        assert_eq!(&encoded[..4], &[0x46, 0x00, 0x69, 0x00]);
        assert_eq!(decode_multibyte_string(&encoded), "Firmata");

        // Odd length: the last character only has its low group.
        assert_eq!(decode_multibyte_string(&[0x41, 0x00, 0x42]), "AB");

        // Trailing NUL padding is dropped.
        assert_eq!(decode_multibyte_string(&[0x41, 0x00, 0x00, 0x00]), "A");

        // Characters beyond 14 bits do not survive.
        assert_eq!(decode_multibyte_string(&encode_multibyte_string("é")), "é");
        assert_ne!(decode_multibyte_string(&encode_multibyte_string("😀")), "😀");
        assert_eq!(decode_multibyte_string(&[]), "");

        // The high group is part of the character, not dropped as in decode_byte.
        assert_eq!(decode_multibyte_string(&[0x41, 0x02]), "Ł");
        assert_eq!(decode_byte(0x41, 0x02), b'A');
    }
}
