//! Infrastructure layer for the netcat engine.
//!
//! Contains the OS-facing adapters: sockets and their tasks, the event
//! bus, the TOML configuration file, and the JSON-lines command bridge.

pub mod command_bridge;
pub mod event_bus;
pub mod network;
pub mod storage;
