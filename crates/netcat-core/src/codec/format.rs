//! Display formats and the bidirectional transforms between them and raw bytes.
//!
//! # Send path vs. receive path
//!
//! ```text
//! send:     display string ──encode_payload(format)──► raw bytes ──► socket
//! receive:  socket ──► raw bytes ──render_received──► lossy UTF-8 text
//! ```
//!
//! The byte count recorded for a message is always the length of the raw
//! payload, never the length of its display string: `"48656C6C6F"` is ten
//! characters of hex but five bytes on the wire.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::hex::{decode_hex, encode_hex};

/// Errors produced when a display string cannot be turned into bytes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Hex input contained an odd number of digits.
    #[error("hex input has an odd number of digits ({digits})")]
    OddHexLength { digits: usize },

    /// Hex input contained a character that is not a digit or separator.
    #[error("invalid hex character '{ch}' at position {position}")]
    InvalidHexDigit { ch: char, position: usize },

    /// Base64 input was rejected by the standard-alphabet decoder.
    #[error("invalid base64 input: {0}")]
    InvalidBase64(String),
}

/// Display format a payload is written in (send) or rendered with (display).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    /// UTF-8 text, passed through unchanged.
    #[default]
    Text,
    /// Pairs of hex digits.
    Hex,
    /// Standard (RFC 4648) base64 with padding.
    Base64,
}

impl DataFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataFormat::Text => "text",
            DataFormat::Hex => "hex",
            DataFormat::Base64 => "base64",
        }
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decodes a display string into the raw bytes that go on the wire.
///
/// # Errors
///
/// Returns [`CodecError`] for malformed hex or base64 input.  Text never fails.
///
/// # Examples
///
/// ```rust
/// use netcat_core::codec::{encode_payload, DataFormat};
///
/// assert_eq!(encode_payload("Hello", DataFormat::Text).unwrap(), b"Hello");
/// assert_eq!(encode_payload("48656C6C6F", DataFormat::Hex).unwrap(), b"Hello");
/// assert_eq!(encode_payload("SGVsbG8=", DataFormat::Base64).unwrap(), b"Hello");
/// ```
pub fn encode_payload(data: &str, format: DataFormat) -> Result<Vec<u8>, CodecError> {
    match format {
        DataFormat::Text => Ok(data.as_bytes().to_vec()),
        DataFormat::Hex => decode_hex(data),
        DataFormat::Base64 => STANDARD
            .decode(data.trim())
            .map_err(|e| CodecError::InvalidBase64(e.to_string())),
    }
}

/// Renders raw bytes in the given display format.
///
/// Used for sent records, whose `data` field shows the payload in the format
/// the caller chose.  Invalid UTF-8 in text mode is replaced with U+FFFD.
pub fn render_payload(bytes: &[u8], format: DataFormat) -> String {
    match format {
        DataFormat::Text => String::from_utf8_lossy(bytes).into_owned(),
        DataFormat::Hex => encode_hex(bytes),
        DataFormat::Base64 => STANDARD.encode(bytes),
    }
}

/// Renders inbound bytes for the live display.
///
/// The receive path always shows lossy UTF-8 text regardless of the format
/// used on the send side.
pub fn render_received(bytes: &[u8]) -> String {
    render_payload(bytes, DataFormat::Text)
}
