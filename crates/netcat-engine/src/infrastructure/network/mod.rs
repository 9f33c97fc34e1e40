//! Socket engine.
//!
//! # Sub-modules
//!
//! - **`session`** – One configured endpoint: observable state behind a short
//!   synchronous lock, plus the live sockets and task handles behind the
//!   per-session command lock.  Routes `start`/`stop`/`send`/kick to the
//!   protocol engines below.
//!
//! - **`tcp_client`** – Bounded-timeout connect and a single read task.
//!
//! - **`tcp_server`** – Accept loop; one read task and one roster entry per
//!   accepted peer.
//!
//! - **`udp`** – Client (ephemeral socket connected to the target) and server
//!   (bound socket, peers tracked by source address, idle eviction).
//!
//! - **`reader`** – Shared stream read loop used by both TCP engines.
//!
//! # Task model
//!
//! ```text
//! TCP client:  [read task]
//! UDP client:  [read task]
//! TCP server:  [accept loop] ──spawns──► [read task per peer] …
//! UDP server:  [recv loop] + [idle sweeper]
//! ```
//!
//! Every task holds an `Arc` of the session's shared state and nothing else.
//! `stop` aborts and awaits every task, so all sockets are closed by the time
//! it returns.  A connect or write still pending in another command is
//! interrupted first through the session's stop signal.

pub mod reader;
pub mod session;
pub mod tcp_client;
pub mod tcp_server;
pub mod udp;

pub use session::Session;
