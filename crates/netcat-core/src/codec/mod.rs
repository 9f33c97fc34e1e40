//! Payload codec: display formats ↔ raw bytes.

pub mod format;
pub mod hex;

pub use format::{encode_payload, render_payload, render_received, CodecError, DataFormat};
