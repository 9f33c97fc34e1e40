//! JSON-lines command bridge between a front end and the session registry.
//!
//! The daemon reads one JSON object per line on stdin and answers each with
//! one JSON line on stdout.  Events are interleaved on stdout as they happen.
//!
//! ```text
//! front end                               netcat-engine
//! ─────────────────────────────────────────────────────────────────────
//! {"id":1,"command":"createSession",  ──►  SessionRegistry::create
//!  "protocol":"tcp","mode":"server",
//!  "host":"127.0.0.1","port":8080}
//!                                     ◄──  {"id":1,"success":true,"data":{…},"error":null}
//!                                     ◄──  {"event":{"type":"statusChanged",…}}
//! ```
//!
//! # `CommandResult`
//!
//! Every command answers with the same envelope:
//! ```json
//! { "id": 1, "success": true,  "data": {...}, "error": null }
//! { "id": 2, "success": false, "data": null,  "error": "...", "errorCode": "NOT_RUNNING" }
//! ```
//! `id` is echoed verbatim when the request carried one.  A line that is not
//! valid JSON, or names an unknown command, gets `errorCode: "BAD_REQUEST"`.
//!
//! # Argument names
//!
//! Arguments use camelCase and sit next to `command` in the same object.
//! `sendMessage` accepts both `targetClientId` and `targetClient`.

use netcat_core::{ClientId, NetcatEvent, SessionConfig, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::application::error::NetcatError;
use crate::application::registry::{SendRequest, SessionRegistry};

/// Records returned by `listMessages` when no limit is given.
pub const DEFAULT_MESSAGE_LIMIT: usize = 200;

// ── Requests ──────────────────────────────────────────────────────────────────

/// One command and its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Command {
    CreateSession(SessionConfig),
    StartSession {
        session_id: SessionId,
    },
    StopSession {
        session_id: SessionId,
    },
    RemoveSession {
        session_id: SessionId,
    },
    SendMessage {
        session_id: SessionId,
        #[serde(flatten)]
        request: SendRequest,
    },
    ListSessions,
    GetSession {
        session_id: SessionId,
    },
    ListMessages {
        session_id: SessionId,
        #[serde(default = "default_message_limit")]
        limit: usize,
    },
    ListClients {
        session_id: SessionId,
    },
    ClearMessages {
        session_id: SessionId,
    },
    DisconnectClient {
        session_id: SessionId,
        client_id: ClientId,
    },
}

fn default_message_limit() -> usize {
    DEFAULT_MESSAGE_LIMIT
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::CreateSession(_) => "createSession",
            Command::StartSession { .. } => "startSession",
            Command::StopSession { .. } => "stopSession",
            Command::RemoveSession { .. } => "removeSession",
            Command::SendMessage { .. } => "sendMessage",
            Command::ListSessions => "listSessions",
            Command::GetSession { .. } => "getSession",
            Command::ListMessages { .. } => "listMessages",
            Command::ListClients { .. } => "listClients",
            Command::ClearMessages { .. } => "clearMessages",
            Command::DisconnectClient { .. } => "disconnectClient",
        }
    }
}

// ── Responses ─────────────────────────────────────────────────────────────────

/// Unified response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    /// Echo of the request's `id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl CommandResult {
    pub fn ok(data: impl Serialize) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => Self {
                id: None,
                success: true,
                data: Some(data),
                error: None,
                error_code: None,
            },
            Err(e) => Self::err("INTERNAL", format!("failed to serialize result: {e}")),
        }
    }

    pub fn err(code: &str, msg: impl Into<String>) -> Self {
        Self {
            id: None,
            success: false,
            data: None,
            error: Some(msg.into()),
            error_code: Some(code.to_string()),
        }
    }

    pub fn with_id(mut self, id: Option<Value>) -> Self {
        self.id = id;
        self
    }
}

impl From<NetcatError> for CommandResult {
    fn from(e: NetcatError) -> Self {
        Self::err(e.code(), e.to_string())
    }
}

impl<T: Serialize> From<Result<T, NetcatError>> for CommandResult {
    fn from(result: Result<T, NetcatError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => e.into(),
        }
    }
}

/// Event line written between responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLine {
    pub event: NetcatEvent,
}

// ── Dispatch ──────────────────────────────────────────────────────────────────

/// Runs one command against the registry.
pub async fn execute(registry: &SessionRegistry, command: Command) -> CommandResult {
    debug!(command = command.name(), "executing command");
    match command {
        Command::CreateSession(config) => registry.create(config).into(),
        Command::StartSession { session_id } => registry.start(session_id).await.into(),
        Command::StopSession { session_id } => registry.stop(session_id).await.into(),
        Command::RemoveSession { session_id } => registry.remove(session_id).await.into(),
        Command::SendMessage {
            session_id,
            request,
        } => registry.send(session_id, request).await.into(),
        Command::ListSessions => CommandResult::ok(registry.list_sessions()),
        Command::GetSession { session_id } => registry.get_session(session_id).into(),
        Command::ListMessages { session_id, limit } => {
            registry.list_messages(session_id, limit).into()
        }
        Command::ListClients { session_id } => registry.list_clients(session_id).into(),
        Command::ClearMessages { session_id } => registry.clear_messages(session_id).into(),
        Command::DisconnectClient {
            session_id,
            client_id,
        } => registry.disconnect_client(session_id, client_id).await.into(),
    }
}

/// Parses one request line and runs it.
pub async fn handle_line(registry: &SessionRegistry, line: &str) -> CommandResult {
    let raw: Value = match serde_json::from_str(line) {
        Ok(raw) => raw,
        Err(e) => return CommandResult::err("BAD_REQUEST", format!("invalid JSON: {e}")),
    };
    let id = raw.get("id").cloned();
    match serde_json::from_value::<Command>(raw) {
        Ok(command) => execute(registry, command).await.with_id(id),
        Err(e) => CommandResult::err("BAD_REQUEST", format!("invalid command: {e}")).with_id(id),
    }
}
