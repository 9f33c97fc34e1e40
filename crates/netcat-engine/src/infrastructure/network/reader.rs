//! Stream read loop shared by the TCP client and TCP server engines.
//!
//! TCP is a byte stream: one `read()` may return part of what the peer wrote
//! or several writes coalesced.  The netcat tool logs each read as one
//! message, exactly as the bytes arrived, without any framing.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

/// Why a read loop stopped.
#[derive(Debug)]
pub enum ReadEnd {
    /// The peer closed its side (`read()` returned 0).
    Eof,
    /// The socket reported an error.
    Failed(io::Error),
}

impl ReadEnd {
    /// Human-readable reason, used as the session's `errorMessage`.
    pub fn describe(&self) -> String {
        match self {
            ReadEnd::Eof => "connection closed by peer".to_string(),
            ReadEnd::Failed(e) => format!("read failed: {e}"),
        }
    }
}

/// Reads from `reader` until EOF or error, handing every chunk to `on_chunk`.
pub async fn pump_reads<R, F>(mut reader: R, buf_size: usize, mut on_chunk: F) -> ReadEnd
where
    R: AsyncRead + Unpin,
    F: FnMut(&[u8]),
{
    let mut buf = vec![0u8; buf_size.max(1)];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => return ReadEnd::Eof,
            Ok(n) => on_chunk(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return ReadEnd::Failed(e),
        }
    }
}
