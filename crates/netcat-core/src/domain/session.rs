//! Session configuration, validation, and the status state machine.
//!
//! # Status state machine
//!
//! ```text
//!                 start(tcp client)          connect ok
//!  Disconnected ──────────────────► Connecting ─────────► Connected
//!   ▲    │  │                          │                     │
//!   │    │  │ start(udp client)        │ connect failed      │ fatal I/O
//!   │    │  └──────────────────────────┼──────► Connected    ▼
//!   │    │ start(server)               └──────────────────► Error
//!   │    └──────────► Listening ── fatal I/O / bind failed ──►  ▲
//!   │                                                          │
//!   └──────────────── stop (from any running state or Error) ──┘
//! ```
//!
//! `Error` is left only through an explicit `start` (which re-enters the same
//! transitions as `Disconnected`) or `stop`.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{now_millis, SessionId};

/// Errors raised while validating a [`SessionConfig`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The port is outside 1–65535.
    #[error("invalid port {0}: must be between 1 and 65535")]
    InvalidPort(u32),

    /// The host is neither an IP literal nor a syntactically valid hostname.
    #[error("invalid host '{host}': {reason}")]
    InvalidHost { host: String, reason: &'static str },

    /// An explicit name was supplied but is blank.
    #[error("session name must not be blank")]
    EmptyName,
}

/// Transport protocol of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("TCP"),
            Protocol::Udp => f.write_str("UDP"),
        }
    }
}

/// Whether a session dials out or accepts peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Client,
    Server,
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionMode::Client => f.write_str("Client"),
            SessionMode::Server => f.write_str("Server"),
        }
    }
}

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Initial state; no socket is open.
    #[default]
    Disconnected,
    /// TCP client handshake in progress.
    Connecting,
    /// Client socket ready to send and receive.
    Connected,
    /// Server socket bound (and listening, for TCP).
    Listening,
    /// A start attempt or a running socket failed.
    Error,
}

impl SessionStatus {
    /// `true` while sockets may be open: connecting, connected, or listening.
    pub fn is_running(self) -> bool {
        matches!(
            self,
            SessionStatus::Connecting | SessionStatus::Connected | SessionStatus::Listening
        )
    }

    /// `true` when a `start` command is allowed.
    pub fn can_start(self) -> bool {
        matches!(self, SessionStatus::Disconnected | SessionStatus::Error)
    }

    /// `true` when the send path is open.
    pub fn accepts_traffic(self) -> bool {
        matches!(self, SessionStatus::Connected | SessionStatus::Listening)
    }

    /// Returns whether `self → next` is an edge of the state machine.
    ///
    /// `Error → Error` is allowed: a failed restart re-enters `Error` with a
    /// fresh message.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        match (self, next) {
            (Disconnected | Error, Connecting | Connected | Listening | Error) => true,
            (Connecting, Connected | Error | Disconnected) => true,
            (Connected | Listening, Error | Disconnected) => true,
            (Error, Disconnected) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Disconnected => "disconnected",
            SessionStatus::Connecting => "connecting",
            SessionStatus::Connected => "connected",
            SessionStatus::Listening => "listening",
            SessionStatus::Error => "error",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unvalidated session parameters as supplied by a caller.
///
/// `port` is wider than `u16` so that out-of-range input is reported as
/// [`ConfigError::InvalidPort`] instead of failing to deserialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub protocol: Protocol,
    pub mode: SessionMode,
    pub host: String,
    pub port: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl SessionConfig {
    pub fn new(protocol: Protocol, mode: SessionMode, host: impl Into<String>, port: u32) -> Self {
        Self {
            protocol,
            mode,
            host: host.into(),
            port,
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Validates host and port syntax and fills in the default name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a port outside 1–65535, an empty or
    /// malformed host, or a blank explicit name.
    pub fn validate(self) -> Result<SessionSpec, ConfigError> {
        let port = u16::try_from(self.port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or(ConfigError::InvalidPort(self.port))?;

        let host = validate_host(&self.host)?;

        let name = match self.name {
            Some(name) if name.trim().is_empty() => return Err(ConfigError::EmptyName),
            Some(name) => name.trim().to_string(),
            None => format!("{} {} {}:{}", self.protocol, self.mode, host, port),
        };

        Ok(SessionSpec {
            protocol: self.protocol,
            mode: self.mode,
            host,
            port,
            name,
        })
    }
}

/// Validated, immutable session parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSpec {
    pub protocol: Protocol,
    pub mode: SessionMode,
    /// IP literal or hostname; IPv6 literals are stored without brackets.
    pub host: String,
    pub port: u16,
    pub name: String,
}

impl SessionSpec {
    /// `host:port` for log lines and error messages.
    pub fn endpoint(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

fn validate_host(raw: &str) -> Result<String, ConfigError> {
    let host = raw.trim();
    let invalid = |reason| ConfigError::InvalidHost {
        host: raw.to_string(),
        reason,
    };

    if host.is_empty() {
        return Err(invalid("host must not be empty"));
    }

    let unbracketed = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if unbracketed.parse::<IpAddr>().is_ok() {
        return Ok(unbracketed.to_string());
    }
    if unbracketed.contains(':') {
        return Err(invalid("not a valid IPv6 address"));
    }

    if host.len() > 253 {
        return Err(invalid("hostname longer than 253 characters"));
    }
    let name = host.strip_suffix('.').unwrap_or(host);
    for label in name.split('.') {
        if label.is_empty() || label.len() > 63 {
            return Err(invalid("hostname label must be 1-63 characters"));
        }
        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(invalid("hostname may contain only letters, digits, '-' and '.'"));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(invalid("hostname label must not start or end with '-'"));
        }
    }

    Ok(host.to_string())
}

/// Point-in-time snapshot of a session, returned by create/list/get commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: SessionId,
    pub protocol: Protocol,
    pub mode: SessionMode,
    pub host: String,
    pub port: u16,
    pub name: String,
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// All-time count of appended records, including evicted ones.
    pub message_count: u64,
    /// Current roster size; always 0 in client mode.
    pub client_count: usize,
    pub created_at: u64,
    /// Bound local address while running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_addr: Option<String>,
}

impl SessionInfo {
    /// A fresh, never-started session.
    pub fn new(id: SessionId, spec: &SessionSpec) -> Self {
        Self {
            id,
            protocol: spec.protocol,
            mode: spec.mode,
            host: spec.host.clone(),
            port: spec.port,
            name: spec.name.clone(),
            status: SessionStatus::Disconnected,
            error_message: None,
            bytes_sent: 0,
            bytes_received: 0,
            message_count: 0,
            client_count: 0,
            created_at: now_millis(),
            local_addr: None,
        }
    }
}
