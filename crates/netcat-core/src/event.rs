//! Events published to observers.
//!
//! Every variant carries only the fields relevant to it.  On the wire the
//! variant is identified by a `"type"` field:
//!
//! ```json
//! {"type":"statusChanged","sessionId":"…","status":"error","errorMessage":"connection refused"}
//! {"type":"clientDisconnected","sessionId":"…","clientId":"…"}
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::{ClientId, ConnectedClient, NetcatMessage, SessionId, SessionStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum NetcatEvent {
    StatusChanged {
        session_id: SessionId,
        status: SessionStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_message: Option<String>,
    },
    MessageReceived {
        session_id: SessionId,
        message: NetcatMessage,
    },
    ClientConnected {
        session_id: SessionId,
        client: ConnectedClient,
    },
    ClientDisconnected {
        session_id: SessionId,
        client_id: ClientId,
    },
}

impl NetcatEvent {
    /// The session that generated this event.
    pub fn session_id(&self) -> SessionId {
        match self {
            NetcatEvent::StatusChanged { session_id, .. }
            | NetcatEvent::MessageReceived { session_id, .. }
            | NetcatEvent::ClientConnected { session_id, .. }
            | NetcatEvent::ClientDisconnected { session_id, .. } => *session_id,
        }
    }

    /// Short variant name for log lines; never includes payload data.
    pub fn kind(&self) -> &'static str {
        match self {
            NetcatEvent::StatusChanged { .. } => "statusChanged",
            NetcatEvent::MessageReceived { .. } => "messageReceived",
            NetcatEvent::ClientConnected { .. } => "clientConnected",
            NetcatEvent::ClientDisconnected { .. } => "clientDisconnected",
        }
    }
}
