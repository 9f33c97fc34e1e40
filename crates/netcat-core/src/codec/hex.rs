//! Hex display format.
//!
//! Input is a sequence of hex digit pairs.  Whitespace, `:`, `-` and `,` may
//! appear anywhere as separators (`48 65 6C`, `48:65:6c`, `48-65`); digits are
//! paired after separators are removed.  Output is always uppercase pairs
//! joined by a single space.

use crate::codec::format::CodecError;

fn is_separator(c: char) -> bool {
    c.is_whitespace() || matches!(c, ':' | '-' | ',')
}

/// Decodes a hex display string into raw bytes.
///
/// # Errors
///
/// - [`CodecError::InvalidHexDigit`] for any character that is neither a hex
///   digit nor a separator.  `position` is the character index in `input`.
/// - [`CodecError::OddHexLength`] when the number of digits is odd.
///
/// # Examples
///
/// ```rust
/// use netcat_core::codec::hex::decode_hex;
///
/// assert_eq!(decode_hex("48 65 6c 6C 6F").unwrap(), b"Hello");
/// assert!(decode_hex("123").is_err());
/// ```
pub fn decode_hex(input: &str) -> Result<Vec<u8>, CodecError> {
    let mut nibbles = Vec::with_capacity(input.len());

    for (position, c) in input.chars().enumerate() {
        if is_separator(c) {
            continue;
        }
        let value = c
            .to_digit(16)
            .ok_or(CodecError::InvalidHexDigit { ch: c, position })?;
        nibbles.push(value as u8);
    }

    if nibbles.len() % 2 != 0 {
        return Err(CodecError::OddHexLength {
            digits: nibbles.len(),
        });
    }

    Ok(nibbles
        .chunks_exact(2)
        .map(|pair| (pair[0] << 4) | pair[1])
        .collect())
}

/// Renders raw bytes as uppercase hex pairs separated by single spaces.
pub fn encode_hex(bytes: &[u8]) -> String {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";

    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push(DIGITS[(byte >> 4) as usize] as char);
        out.push(DIGITS[(byte & 0x0F) as usize] as char);
    }
    out
}
