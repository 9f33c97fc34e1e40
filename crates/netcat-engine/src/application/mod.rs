//! Application layer: the command surface of the netcat tool.
//!
//! # Sub-modules
//!
//! - **`registry`** – `SessionRegistry`, the process-wide map of sessions and
//!   the entry point for every command (create, start, stop, remove, send,
//!   queries, kick).
//!
//! - **`error`** – `NetcatError`, the error taxonomy every command returns,
//!   with a stable code per variant.

pub mod error;
pub mod registry;

pub use error::{NetcatError, Result};
pub use registry::{SendRequest, SessionRegistry};
