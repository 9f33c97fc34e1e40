//! SessionRegistry: the process-wide set of netcat sessions.
//!
//! Every command addresses a session by id.  The registry map is guarded by a
//! `parking_lot::RwLock` that is held only for the lookup itself; the command
//! then runs against the session's own lock.  A slow `start` (a TCP connect
//! waiting out its timeout, say) therefore never blocks commands aimed at
//! other sessions.
//!
//! # Ordering
//!
//! `list_sessions` returns sessions in creation order.  `list_messages`
//! returns a session's records newest first.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use netcat_core::{
    ClientId, ConnectedClient, DataFormat, NetcatMessage, SessionConfig, SessionId, SessionInfo,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::application::error::{NetcatError, Result};
use crate::infrastructure::event_bus::{EventBus, EventSubscriber};
use crate::infrastructure::network::Session;
use crate::infrastructure::storage::EngineConfig;

/// Arguments of a send command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub data: String,
    #[serde(default)]
    pub format: DataFormat,
    /// Server mode: the roster entry to write to.
    #[serde(default, alias = "targetClient")]
    pub target_client_id: Option<ClientId>,
    /// Server mode: write to every roster entry.  Takes precedence over
    /// `target_client_id`.
    #[serde(default)]
    pub broadcast: bool,
}

impl SendRequest {
    pub fn new(data: impl Into<String>, format: DataFormat) -> Self {
        Self {
            data: data.into(),
            format,
            target_client_id: None,
            broadcast: false,
        }
    }

    pub fn to_client(mut self, client_id: ClientId) -> Self {
        self.target_client_id = Some(client_id);
        self
    }

    pub fn to_all(mut self) -> Self {
        self.broadcast = true;
        self
    }
}

struct Entry {
    seq: u64,
    session: Arc<Session>,
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Entry>>,
    next_seq: AtomicU64,
    bus: EventBus,
    settings: Arc<EngineConfig>,
}

impl SessionRegistry {
    pub fn new(settings: EngineConfig) -> Self {
        let bus = EventBus::new(settings.event_capacity);
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            bus,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &EngineConfig {
        &self.settings
    }

    /// Opens a new event stream.  Each subscriber sees every event published
    /// after this call.
    pub fn subscribe(&self) -> EventSubscriber {
        self.bus.subscribe()
    }

    fn session(&self, id: SessionId) -> Result<Arc<Session>> {
        self.sessions
            .read()
            .get(&id)
            .map(|e| Arc::clone(&e.session))
            .ok_or(NetcatError::SessionNotFound(id))
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Validates `config` and registers a new `disconnected` session.
    pub fn create(&self, config: SessionConfig) -> Result<SessionInfo> {
        let spec = config.validate()?;
        let id = Uuid::new_v4();
        let session = Arc::new(Session::new(
            id,
            spec,
            self.bus.clone(),
            Arc::clone(&self.settings),
        ));
        let info = session.info();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.sessions.write().insert(id, Entry { seq, session });
        info!(session = %id, name = %info.name, "session created");
        Ok(info)
    }

    pub async fn start(&self, id: SessionId) -> Result<SessionInfo> {
        let session = self.session(id)?;
        session.start().await?;
        Ok(session.info())
    }

    pub async fn stop(&self, id: SessionId) -> Result<SessionInfo> {
        let session = self.session(id)?;
        session.stop().await?;
        Ok(session.info())
    }

    /// Stops the session if running and forgets it.
    pub async fn remove(&self, id: SessionId) -> Result<()> {
        let entry = self
            .sessions
            .write()
            .remove(&id)
            .ok_or(NetcatError::SessionNotFound(id))?;
        entry.session.remove().await;
        info!(session = %id, "session removed");
        Ok(())
    }

    /// Stops every session.  Used on process exit.
    pub async fn shutdown(&self) {
        let sessions: Vec<Arc<Session>> = self
            .sessions
            .write()
            .drain()
            .map(|(_, e)| e.session)
            .collect();
        let count = sessions.len();
        for session in sessions {
            session.remove().await;
        }
        info!(sessions = count, "registry shut down");
    }

    // ── Traffic ───────────────────────────────────────────────────────────────

    pub async fn send(&self, id: SessionId, request: SendRequest) -> Result<NetcatMessage> {
        self.session(id)?.send(request).await
    }

    pub async fn disconnect_client(&self, id: SessionId, client_id: ClientId) -> Result<()> {
        self.session(id)?.disconnect_client(client_id).await
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        let mut entries: Vec<(u64, Arc<Session>)> = self
            .sessions
            .read()
            .values()
            .map(|e| (e.seq, Arc::clone(&e.session)))
            .collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, s)| s.info()).collect()
    }

    pub fn get_session(&self, id: SessionId) -> Result<SessionInfo> {
        Ok(self.session(id)?.info())
    }

    /// Up to `limit` records, newest first.
    pub fn list_messages(&self, id: SessionId, limit: usize) -> Result<Vec<NetcatMessage>> {
        Ok(self.session(id)?.recent_messages(limit))
    }

    pub fn list_clients(&self, id: SessionId) -> Result<Vec<ConnectedClient>> {
        Ok(self.session(id)?.clients())
    }

    pub fn clear_messages(&self, id: SessionId) -> Result<()> {
        self.session(id)?.clear_messages();
        Ok(())
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
