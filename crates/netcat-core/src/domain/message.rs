//! Message records and roster entries.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec::{render_payload, render_received, DataFormat};
use crate::domain::{now_millis, ClientId, MessageId, SessionId};

/// Direction of a message relative to the local session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Sent,
    Received,
}

/// One logged payload.
///
/// `size` is the raw byte length of the payload and is independent of the
/// display representation in `data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetcatMessage {
    pub id: MessageId,
    pub session_id: SessionId,
    pub direction: Direction,
    pub data: String,
    pub format: DataFormat,
    pub size: usize,
    pub timestamp: u64,
    /// Peer address; present for server-mode sessions only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_addr: Option<SocketAddr>,
}

impl NetcatMessage {
    /// Record for one physical write, rendered in the caller's send format.
    pub fn sent(
        session_id: SessionId,
        payload: &[u8],
        format: DataFormat,
        client_addr: Option<SocketAddr>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            direction: Direction::Sent,
            data: render_payload(payload, format),
            format,
            size: payload.len(),
            timestamp: now_millis(),
            client_addr,
        }
    }

    /// Record for one inbound read, always rendered as lossy UTF-8 text.
    pub fn received(session_id: SessionId, payload: &[u8], client_addr: Option<SocketAddr>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            direction: Direction::Received,
            data: render_received(payload),
            format: DataFormat::Text,
            size: payload.len(),
            timestamp: now_millis(),
            client_addr,
        }
    }
}

/// A peer currently on a server-mode session's roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedClient {
    pub id: ClientId,
    pub addr: SocketAddr,
    pub connected_at: u64,
}

impl ConnectedClient {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            id: Uuid::new_v4(),
            addr,
            connected_at: now_millis(),
        }
    }
}
