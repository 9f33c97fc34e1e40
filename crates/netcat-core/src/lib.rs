//! # netcat-core
//!
//! Shared library for the netcat protocol tester containing the payload codec,
//! the session data model, the bounded message store, and the event types
//! published to observers.
//!
//! This crate has zero dependencies on sockets, async runtimes, or UI
//! frameworks.  Everything that touches the network lives in `netcat-engine`.
//!
//! # Architecture overview
//!
//! The netcat tool manages any number of independent TCP/UDP sessions.  Each
//! session is either a client (it dials out) or a server (it accepts peers),
//! and every byte that crosses its socket is logged as a message record.
//!
//! This crate defines:
//!
//! - **`codec`** – How a display string (text, hex, base64) becomes raw bytes
//!   on the wire, and how raw bytes are rendered back for display.
//!
//! - **`domain`** – Session configuration and validation, the status state
//!   machine, and the records handed to callers (`SessionInfo`,
//!   `ConnectedClient`, `NetcatMessage`).
//!
//! - **`store`** – `MessageStore`, the bounded per-session history that evicts
//!   the oldest record once full while still counting every insert.
//!
//! - **`event`** – `NetcatEvent`, the tagged variant carried on the event bus.

pub mod codec;
pub mod domain;
pub mod event;
pub mod store;

pub use codec::{encode_payload, render_payload, render_received, CodecError, DataFormat};
pub use domain::{
    now_millis, ClientId, ConfigError, ConnectedClient, Direction, MessageId, NetcatMessage,
    Protocol, SessionConfig, SessionId, SessionInfo, SessionMode, SessionSpec, SessionStatus,
};
pub use event::NetcatEvent;
pub use store::MessageStore;
