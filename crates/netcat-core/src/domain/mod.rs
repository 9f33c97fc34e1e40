//! Domain types for the netcat tool.
//!
//! Pure data and validation: nothing here opens a socket or spawns a task.
//! The engine crate owns the behaviour; these types describe what it reports.

pub mod message;
pub mod session;

use std::time::{SystemTime, UNIX_EPOCH};

pub use message::{ConnectedClient, Direction, NetcatMessage};
pub use session::{
    ConfigError, Protocol, SessionConfig, SessionInfo, SessionMode, SessionSpec, SessionStatus,
};

/// Identifier of a session, unique for the lifetime of the registry.
pub type SessionId = uuid::Uuid;

/// Identifier of a roster entry, unique within its owning session.
pub type ClientId = uuid::Uuid;

/// Identifier of a message record.
pub type MessageId = uuid::Uuid;

/// Current wall-clock time as milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
