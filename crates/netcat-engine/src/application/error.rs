//! Error taxonomy for registry commands.
//!
//! # Propagation policy
//!
//! - Configuration and addressing errors (`InvalidConfig`, `SessionNotFound`,
//!   `ClientNotFound`, `AlreadyRunning`, `NotRunning`, `EncodingError`,
//!   `MissingTarget`, `NoClients`) are returned to the caller and never touch
//!   session state.
//! - `Cancelled` is returned by a `start` or `send` whose socket wait was
//!   interrupted by `stop`; the stop itself decides the final status.
//! - Socket failures during `start` (`BindFailed`, `ConnectFailed`, `IoError`)
//!   move the session to `error` with `errorMessage` set *and* are returned.
//! - Socket failures after a session is running are reported only through a
//!   `statusChanged` event; they never surface from an unrelated command.

use std::io;

use netcat_core::{ClientId, CodecError, ConfigError, SessionId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetcatError {
    /// Malformed host, port or name at creation time.
    #[error("invalid session config: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("client not found: {0}")]
    ClientNotFound(ClientId),

    /// `start` on a session that is connecting, connected or listening.
    #[error("session {0} is already running")]
    AlreadyRunning(SessionId),

    /// `send` on a session that is not connected or listening.
    #[error("session {0} is not running")]
    NotRunning(SessionId),

    /// A pending connect or write was cut short by `stop` or `remove`.
    #[error("session {0} was stopped while the command was in flight")]
    Cancelled(SessionId),

    #[error("bind failed on {addr}: {source}")]
    BindFailed {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("connect to {addr} failed: {reason}")]
    ConnectFailed { addr: String, reason: String },

    /// Malformed hex or base64 payload.
    #[error("encoding error: {0}")]
    EncodingError(#[from] CodecError),

    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// Server-mode send without a target client and without broadcast.
    #[error("server sessions need a target client or broadcast")]
    MissingTarget,

    /// Broadcast requested while the roster is empty.
    #[error("no connected clients to broadcast to")]
    NoClients,
}

impl NetcatError {
    /// Stable machine-readable code for the command bridge.
    pub fn code(&self) -> &'static str {
        match self {
            NetcatError::InvalidConfig(_) => "INVALID_CONFIG",
            NetcatError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            NetcatError::ClientNotFound(_) => "CLIENT_NOT_FOUND",
            NetcatError::AlreadyRunning(_) => "ALREADY_RUNNING",
            NetcatError::NotRunning(_) => "NOT_RUNNING",
            NetcatError::Cancelled(_) => "CANCELLED",
            NetcatError::BindFailed { .. } => "BIND_FAILED",
            NetcatError::ConnectFailed { .. } => "CONNECT_FAILED",
            NetcatError::EncodingError(_) => "ENCODING_ERROR",
            NetcatError::IoError(_) => "IO_ERROR",
            NetcatError::MissingTarget => "MISSING_TARGET",
            NetcatError::NoClients => "NO_CLIENTS",
        }
    }
}

/// Shorthand used throughout the engine.
pub type Result<T, E = NetcatError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_codec_error_converts_to_encoding_error() {
        let err: NetcatError = CodecError::OddHexLength { digits: 3 }.into();
        assert_eq!(err.code(), "ENCODING_ERROR");
        assert!(err.to_string().contains("odd number of digits"));
    }

    #[test]
    fn test_config_error_converts_to_invalid_config() {
        let err: NetcatError = ConfigError::InvalidPort(0).into();
        assert_eq!(err.code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_bind_failed_keeps_io_source() {
        let err = NetcatError::BindFailed {
            addr: "127.0.0.1:80".to_string(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("127.0.0.1:80"));
    }

    #[test]
    fn test_codes_are_distinct() {
        let id = Uuid::new_v4();
        let codes = [
            NetcatError::SessionNotFound(id).code(),
            NetcatError::ClientNotFound(id).code(),
            NetcatError::AlreadyRunning(id).code(),
            NetcatError::NotRunning(id).code(),
            NetcatError::Cancelled(id).code(),
            NetcatError::MissingTarget.code(),
            NetcatError::NoClients.code(),
        ];
        let unique: std::collections::HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), codes.len());
    }
}
