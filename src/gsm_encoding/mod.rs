//! Utilities for dealing with the GSM 7-bit default alphabet (TS 23.038),
//! tight septet packing, and UCS-2 text.
//!
//! These are pure functions: no allocation beyond the returned buffer/string,
//! no I/O, and no partial results on error.

pub mod udh;

use crate::errors::DecodeError;

/// GSM 03.38 default alphabet, single-septet table. Septet `0x00` decodes to
/// `@` and must never be treated as a string terminator.
pub static GSM_ENCODING_TABLE: [(char, u8); 65] = [
    ('@', 0x00),
    ('\u{00A3}', 0x01),
    ('$', 0x02),
    ('\u{00A5}', 0x03),
    ('è', 0x04),
    ('é', 0x05),
    ('ù', 0x06),
    ('ì', 0x07),
    ('ò', 0x08),
    ('\u{00C7}', 0x09),
    ('\n', 0x0a),
    ('\u{00D8}', 0x0b),
    ('\u{00F8}', 0x0c),
    ('\r', 0x0d),
    ('\u{00C5}', 0x0e),
    ('\u{00E5}', 0x0f),
    ('\u{0394}', 0x10),
    ('_', 0x11),
    ('\u{03A6}', 0x12),
    ('Γ', 0x13),
    ('Λ', 0x14),
    ('Ω', 0x15),
    ('Π', 0x16),
    ('Ψ', 0x17),
    ('Σ', 0x18),
    ('Θ', 0x19),
    ('Ξ', 0x1A),
    ('Æ', 0x1C),
    ('æ', 0x1D),
    ('ß', 0x1E),
    ('É', 0x1F),
    (' ', 0x20),
    ('!', 0x21),
    ('"', 0x22),
    ('#', 0x23),
    ('¤', 0x24),
    ('%', 0x25),
    ('&', 0x26),
    ('\'', 0x27),
    ('(', 0x28),
    (')', 0x29),
    ('*', 0x2A),
    ('+', 0x2B),
    (',', 0x2C),
    ('-', 0x2D),
    ('.', 0x2E),
    ('/', 0x2F),
    (':', 0x3A),
    (';', 0x3B),
    ('<', 0x3C),
    ('=', 0x3D),
    ('>', 0x3E),
    ('?', 0x3F),
    ('¡', 0x40),
    ('Ä', 0x5B),
    ('Ö', 0x5C),
    ('Ñ', 0x5D),
    ('Ü', 0x5E),
    ('§', 0x5F),
    ('¿', 0x60),
    ('ä', 0x7B),
    ('ö', 0x7C),
    ('ñ', 0x7D),
    ('ü', 0x7E),
    ('à', 0x7F),
];

/// Two-septet extension table reached via the `0x1B` escape septet.
pub static GSM_EXTENDED_ENCODING_TABLE: [(char, u8); 9] = [
    ('^', 0x14),
    ('{', 0x28),
    ('}', 0x29),
    ('\\', 0x2F),
    ('[', 0x3C),
    ('~', 0x3D),
    (']', 0x3E),
    ('|', 0x40),
    ('\u{20AC}', 0x65),
];

/// Decode a buffer of **unpacked** septets (one per byte, high bit clear)
/// into text, per the GSM 03.38 default alphabet. `0x00` decodes to `@` and
/// is never treated as a terminator. Unknown two-septet escape sequences
/// decode as `?`.
pub fn gsm_decode_string(input: &[u8]) -> String {
    let mut ret = String::with_capacity(input.len());
    let mut skip = false;
    for (i, b) in input.iter().enumerate() {
        if skip {
            skip = false;
            continue;
        }
        match *b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' => {
                ret.push(*b as char);
            }
            0x1B => {
                if let Some(next) = input.get(i + 1) {
                    skip = true;
                    match GSM_EXTENDED_ENCODING_TABLE.iter().find(|&&(_, v)| v == *next) {
                        Some(&(ch, _)) => ret.push(ch),
                        None => ret.push('?'),
                    }
                } else {
                    ret.push('?');
                }
            }
            b => {
                if let Some(&(ch, _)) = GSM_ENCODING_TABLE.iter().find(|&&(_, v)| v == b) {
                    ret.push(ch);
                } else {
                    ret.push('?');
                }
            }
        }
    }
    ret
}

/// Unpack `skip + count` septets out of a tightly-packed (LSB-first) septet
/// stream, discarding the first `skip` septets, and returning exactly
/// `count` septet values (each `0..=0x7F`).
///
/// This is used both for 7-bit user data (`skip` is the UDH padding septets)
/// and for GSM-7bit-packed alphanumeric addresses (`skip == 0`). The output
/// length is always exactly `count`: no phantom trailing septet is ever
/// synthesized from leftover padding bits.
pub fn unpack_septets(bytes: &[u8], skip: usize, count: usize) -> Result<Vec<u8>, DecodeError> {
    let total = skip + count;
    let total_bits = bytes.len() * 8;
    let mut septets = Vec::with_capacity(total);
    for i in 0..total {
        let bit_start = i * 7;
        if bit_start + 7 > total_bits {
            return Err(DecodeError::Failed("septet stream truncated"));
        }
        let byte_idx = bit_start / 8;
        let bit_off = bit_start % 8;
        let lo = bytes[byte_idx] as u16;
        let hi = bytes.get(byte_idx + 1).copied().unwrap_or(0) as u16;
        let combined = lo | (hi << 8);
        septets.push(((combined >> bit_off) & 0x7F) as u8);
    }
    Ok(septets.split_off(skip))
}

/// Decode a UCS-2 (UTF-16BE) buffer into a `String`. Surrogate handling is
/// strict: an unpaired or invalid surrogate is a decode failure, not a
/// lossy replacement, per the "bad UTF-16 surrogate" failure mode.
pub fn decode_ucs2(input: &[u8]) -> Result<String, DecodeError> {
    if input.len() % 2 != 0 {
        return Err(DecodeError::Failed("odd-length UCS-2 payload"));
    }
    let units: Vec<u16> = input
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect();

    char::decode_utf16(units)
        .collect::<Result<String, _>>()
        .map_err(|_| DecodeError::Failed("invalid UTF-16BE"))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_alphabet_preserves_at_sign() {
        let decoded = gsm_decode_string(&[0x00]);
        assert_eq!(decoded, "@");
    }

    #[test]
    fn unpack_septets_at_octet_boundary() {
        // "hellohel", 8 septets, packed tightly into 7 octets -- the
        // classic GSM 7-bit boundary case.
        let packed = [0xE8, 0x32, 0x9B, 0xFD, 0x46, 0x97, 0xD9];
        let unpacked = unpack_septets(&packed, 0, 8).unwrap();
        assert_eq!(gsm_decode_string(&unpacked), "hellohel");
    }

    #[test]
    fn unpack_septets_skips_leading_udh_padding() {
        // Same payload, preceded by one filler septet of padding (as the
        // UDH-present 7-bit path inserts to byte-align the text).
        let packed = [0x00, 0x74, 0x99, 0xCD, 0x7E, 0xA3, 0xCB, 0x6C];
        let unpacked = unpack_septets(&packed, 1, 8).unwrap();
        assert_eq!(unpacked.len(), 8);
        assert_eq!(gsm_decode_string(&unpacked), "hellohel");
    }

    #[test]
    fn unpack_septets_rejects_truncated_stream() {
        let packed = [0xE8];
        assert!(unpack_septets(&packed, 0, 8).is_err());
    }

    #[test]
    fn ucs2_decodes_surrogate_pair() {
        // U+1F600, encoded as the UTF-16BE surrogate pair D83D DE00.
        let bytes = [0xD8, 0x3D, 0xDE, 0x00];
        let decoded = decode_ucs2(&bytes).unwrap();
        assert_eq!(decoded, "\u{1F600}");
    }

    #[test]
    fn ucs2_rejects_unpaired_surrogate() {
        // 0xD800 is a lone high surrogate with no following low surrogate.
        let bytes = [0xD8, 0x00];
        assert!(decode_ucs2(&bytes).is_err());
    }

    #[test]
    fn unknown_escape_decodes_as_question_mark() {
        let decoded = gsm_decode_string(&[0x1B, 0x00]);
        assert_eq!(decoded, "?");
    }
}
