//! One netcat session: its observable state and its live sockets.
//!
//! # Two locks, two jobs
//!
//! - [`SessionShared::state`] is a `parking_lot` mutex guarding status,
//!   counters, the message store and the client roster.  It is only ever held
//!   for a few field updates and is never held across an `.await`, so socket
//!   tasks and command handlers can touch it freely.  Events are published
//!   while it is held, which is what keeps one session's events in order.
//!
//! - [`Session::slot`] is a `tokio` mutex guarding the runtime (sockets and
//!   task handles).  Every command that changes or uses the runtime holds it
//!   for its whole duration, including the awaits inside, so `start`, `stop`,
//!   `send` and kick on one session are strictly serialized.  Different
//!   sessions never share it.
//!
//! # Stop signal
//!
//! A command that waits on the network (the TCP connect inside `start`, the
//! writes inside `send`) races that wait against the session's stop signal,
//! a [`CancellationToken`] taken *before* queueing on the slot.  `stop` and
//! `remove` fire the signal first and only then queue, so a peer that never
//! reads or a SYN that never gets answered cannot hold them up.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use netcat_core::{
    encode_payload, ClientId, ConnectedClient, DataFormat, NetcatEvent, NetcatMessage,
    MessageStore, Protocol, SessionId, SessionInfo, SessionMode, SessionSpec, SessionStatus,
};
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::error::{NetcatError, Result};
use crate::application::registry::SendRequest;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::network::{tcp_client, tcp_server, udp};
use crate::infrastructure::storage::EngineConfig;

// ── Roster ────────────────────────────────────────────────────────────────────

/// How outbound bytes reach one roster entry.
#[derive(Clone)]
pub enum PeerLink {
    /// Write half of an accepted TCP stream.  The async mutex lets a send
    /// hold it across `write_all` without touching the state lock.
    Tcp(Arc<tokio::sync::Mutex<OwnedWriteHalf>>),
    /// Datagrams go out through the session's bound socket.
    Udp,
}

pub struct RosterEntry {
    pub client: ConnectedClient,
    pub link: PeerLink,
    pub last_seen: Instant,
    /// Per-peer read task (TCP only).
    pub task: Option<JoinHandle<()>>,
}

/// A resolved send destination, copied out of the roster so the write can
/// happen without holding the state lock.
struct Target {
    client_id: ClientId,
    addr: SocketAddr,
    link: PeerLink,
}

// ── Shared state ──────────────────────────────────────────────────────────────

struct SessionState {
    status: SessionStatus,
    error_message: Option<String>,
    bytes_sent: u64,
    bytes_received: u64,
    store: MessageStore,
    roster: Vec<RosterEntry>,
    local_addr: Option<SocketAddr>,
}

/// State visible to both command handlers and socket tasks.
pub struct SessionShared {
    pub id: SessionId,
    pub spec: SessionSpec,
    pub settings: Arc<EngineConfig>,
    created_at: u64,
    bus: EventBus,
    state: Mutex<SessionState>,
    stop_signal: Mutex<CancellationToken>,
}

impl SessionShared {
    pub fn status(&self) -> SessionStatus {
        self.state.lock().status
    }

    /// Moves to `next` if the state machine allows it and announces the
    /// change.  Returns `false` (and changes nothing) for an illegal edge.
    pub fn transition(&self, next: SessionStatus, error_message: Option<String>) -> bool {
        let mut state = self.state.lock();
        self.apply_transition(&mut state, next, error_message)
    }

    fn apply_transition(
        &self,
        state: &mut SessionState,
        next: SessionStatus,
        error_message: Option<String>,
    ) -> bool {
        if !state.status.can_transition_to(next) {
            debug!(
                session = %self.id,
                from = %state.status,
                to = %next,
                "ignoring illegal status transition"
            );
            return false;
        }
        state.status = next;
        state.error_message = error_message.clone();
        match &error_message {
            Some(reason) => warn!(session = %self.id, status = %next, %reason, "session status changed"),
            None => info!(session = %self.id, status = %next, "session status changed"),
        }
        self.bus.publish(NetcatEvent::StatusChanged {
            session_id: self.id,
            status: next,
            error_message,
        });
        true
    }

    /// Runtime failure reported by a socket task.  Only a running session can
    /// fail; a task that loses a race with `stop` changes nothing.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        let mut state = self.state.lock();
        if !state.status.is_running() {
            return false;
        }
        self.apply_transition(&mut state, SessionStatus::Error, Some(reason.into()))
    }

    /// Fatal failure of a server socket.  The session moves to `error` and
    /// its peers go with it: every roster entry is dropped and its read task
    /// aborted.
    pub fn fail_server(&self, reason: impl Into<String>) -> bool {
        if !self.fail(reason) {
            return false;
        }
        for task in self.drain_roster().into_iter().filter_map(|e| e.task) {
            task.abort();
        }
        true
    }

    /// The signal the next network wait should give up on.
    fn stop_signal(&self) -> CancellationToken {
        self.stop_signal.lock().clone()
    }

    /// Fires the current stop signal and arms a fresh one for later
    /// commands.
    fn interrupt(&self) {
        let fired = std::mem::replace(&mut *self.stop_signal.lock(), CancellationToken::new());
        fired.cancel();
    }

    pub fn set_local_addr(&self, addr: Option<SocketAddr>) {
        self.state.lock().local_addr = addr;
    }

    /// Logs one inbound chunk and announces it.
    pub fn record_received(&self, payload: &[u8], client_addr: Option<SocketAddr>) {
        let message = NetcatMessage::received(self.id, payload, client_addr);
        let mut state = self.state.lock();
        state.bytes_received += payload.len() as u64;
        state.store.push(message.clone());
        debug!(session = %self.id, size = payload.len(), "received");
        self.bus.publish(NetcatEvent::MessageReceived {
            session_id: self.id,
            message,
        });
    }

    /// Logs one completed physical write.
    pub fn record_sent(
        &self,
        payload: &[u8],
        format: DataFormat,
        client_addr: Option<SocketAddr>,
    ) -> NetcatMessage {
        let message = NetcatMessage::sent(self.id, payload, format, client_addr);
        let mut state = self.state.lock();
        state.bytes_sent += payload.len() as u64;
        state.store.push(message.clone());
        debug!(session = %self.id, size = payload.len(), "sent");
        message
    }

    // ── Roster ────────────────────────────────────────────────────────────────

    /// Adds a peer and announces it.
    pub fn admit_client(&self, addr: SocketAddr, link: PeerLink) -> ConnectedClient {
        let client = ConnectedClient::new(addr);
        let mut state = self.state.lock();
        state.roster.push(RosterEntry {
            client: client.clone(),
            link,
            last_seen: Instant::now(),
            task: None,
        });
        info!(session = %self.id, client = %client.id, %addr, "client connected");
        self.bus.publish(NetcatEvent::ClientConnected {
            session_id: self.id,
            client: client.clone(),
        });
        client
    }

    /// Hands the peer's read task to its roster entry.  If the peer is
    /// already gone the task is aborted.
    pub fn attach_client_task(&self, client_id: ClientId, task: JoinHandle<()>) {
        let mut state = self.state.lock();
        match state.roster.iter_mut().find(|e| e.client.id == client_id) {
            Some(entry) => entry.task = Some(task),
            None => task.abort(),
        }
    }

    /// Refreshes a UDP peer's activity time, admitting it on first contact.
    pub fn touch_udp_peer(&self, addr: SocketAddr) {
        {
            let mut state = self.state.lock();
            if let Some(entry) = state.roster.iter_mut().find(|e| e.client.addr == addr) {
                entry.last_seen = Instant::now();
                return;
            }
        }
        self.admit_client(addr, PeerLink::Udp);
    }

    /// Removes one peer, announcing the departure exactly once.
    pub fn remove_client(&self, client_id: ClientId) -> Option<RosterEntry> {
        let mut state = self.state.lock();
        let index = state.roster.iter().position(|e| e.client.id == client_id)?;
        let entry = state.roster.remove(index);
        info!(session = %self.id, client = %client_id, addr = %entry.client.addr, "client disconnected");
        self.bus.publish(NetcatEvent::ClientDisconnected {
            session_id: self.id,
            client_id,
        });
        Some(entry)
    }

    /// Removes UDP peers silent for longer than `idle`.
    pub fn evict_idle_peers(&self, idle: Duration) -> usize {
        let mut state = self.state.lock();
        let (stale, fresh): (Vec<_>, Vec<_>) = std::mem::take(&mut state.roster)
            .into_iter()
            .partition(|e| e.last_seen.elapsed() >= idle);
        state.roster = fresh;
        for entry in &stale {
            info!(session = %self.id, addr = %entry.client.addr, "evicting idle udp peer");
            self.bus.publish(NetcatEvent::ClientDisconnected {
                session_id: self.id,
                client_id: entry.client.id,
            });
        }
        stale.len()
    }

    /// Empties the roster, announcing every departure.
    fn drain_roster(&self) -> Vec<RosterEntry> {
        let mut state = self.state.lock();
        let drained = std::mem::take(&mut state.roster);
        for entry in &drained {
            self.bus.publish(NetcatEvent::ClientDisconnected {
                session_id: self.id,
                client_id: entry.client.id,
            });
        }
        drained
    }

    fn resolve_targets(&self, target: Option<ClientId>, broadcast: bool) -> Result<Vec<Target>> {
        let state = self.state.lock();
        let to_target = |e: &RosterEntry| Target {
            client_id: e.client.id,
            addr: e.client.addr,
            link: e.link.clone(),
        };
        if broadcast {
            if state.roster.is_empty() {
                return Err(NetcatError::NoClients);
            }
            return Ok(state.roster.iter().map(to_target).collect());
        }
        let client_id = target.ok_or(NetcatError::MissingTarget)?;
        state
            .roster
            .iter()
            .find(|e| e.client.id == client_id)
            .map(|e| vec![to_target(e)])
            .ok_or(NetcatError::ClientNotFound(client_id))
    }

    // ── Snapshots ─────────────────────────────────────────────────────────────

    pub fn info(&self) -> SessionInfo {
        let state = self.state.lock();
        SessionInfo {
            status: state.status,
            error_message: state.error_message.clone(),
            bytes_sent: state.bytes_sent,
            bytes_received: state.bytes_received,
            message_count: state.store.total_appended(),
            client_count: state.roster.len(),
            created_at: self.created_at,
            local_addr: state.local_addr.map(|a| a.to_string()),
            ..SessionInfo::new(self.id, &self.spec)
        }
    }

    pub fn recent_messages(&self, limit: usize) -> Vec<NetcatMessage> {
        self.state.lock().store.recent(limit)
    }

    pub fn clients(&self) -> Vec<ConnectedClient> {
        self.state
            .lock()
            .roster
            .iter()
            .map(|e| e.client.clone())
            .collect()
    }

    /// Drops stored records; counters and `messageCount` are untouched.
    pub fn clear_messages(&self) {
        self.state.lock().store.clear();
    }
}

// ── Runtime ───────────────────────────────────────────────────────────────────

/// Live sockets and tasks of a running session.
pub enum Runtime {
    TcpClient {
        writer: OwnedWriteHalf,
        reader: JoinHandle<()>,
    },
    UdpClient {
        socket: Arc<UdpSocket>,
        reader: JoinHandle<()>,
    },
    TcpServer {
        acceptor: JoinHandle<()>,
    },
    UdpServer {
        socket: Arc<UdpSocket>,
        reader: JoinHandle<()>,
        sweeper: Option<JoinHandle<()>>,
    },
}

impl Runtime {
    /// Aborts every task and waits for it, so the sockets they own are
    /// closed when this returns.
    async fn shutdown(self) {
        let tasks = match self {
            Runtime::TcpClient { reader, .. } => vec![reader],
            Runtime::UdpClient { reader, .. } => vec![reader],
            Runtime::TcpServer { acceptor } => vec![acceptor],
            Runtime::UdpServer {
                reader, sweeper, ..
            } => std::iter::once(reader).chain(sweeper).collect(),
        };
        join_aborted(tasks).await;
    }
}

async fn join_aborted(tasks: impl IntoIterator<Item = JoinHandle<()>>) {
    for task in tasks {
        task.abort();
        let _ = task.await;
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Slot {
    runtime: Option<Runtime>,
    removed: bool,
}

/// A configured endpoint and whatever sockets it currently owns.
pub struct Session {
    shared: Arc<SessionShared>,
    slot: tokio::sync::Mutex<Slot>,
}

impl Session {
    pub fn new(id: SessionId, spec: SessionSpec, bus: EventBus, settings: Arc<EngineConfig>) -> Self {
        let created_at = SessionInfo::new(id, &spec).created_at;
        let store = MessageStore::new(settings.message_capacity);
        Self {
            shared: Arc::new(SessionShared {
                id,
                spec,
                settings,
                created_at,
                bus,
                state: Mutex::new(SessionState {
                    status: SessionStatus::Disconnected,
                    error_message: None,
                    bytes_sent: 0,
                    bytes_received: 0,
                    store,
                    roster: Vec::new(),
                    local_addr: None,
                }),
                stop_signal: Mutex::new(CancellationToken::new()),
            }),
            slot: tokio::sync::Mutex::new(Slot::default()),
        }
    }

    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    pub fn info(&self) -> SessionInfo {
        self.shared.info()
    }

    pub fn recent_messages(&self, limit: usize) -> Vec<NetcatMessage> {
        self.shared.recent_messages(limit)
    }

    pub fn clients(&self) -> Vec<ConnectedClient> {
        self.shared.clients()
    }

    pub fn clear_messages(&self) {
        self.shared.clear_messages();
    }

    /// Opens the session's socket according to its protocol and mode.
    ///
    /// On a socket failure the session moves to `error` and the failure is
    /// also returned.
    ///
    /// A `stop` issued meanwhile interrupts the connect; `start` then returns
    /// [`NetcatError::Cancelled`] and the stop settles the status.
    pub async fn start(&self) -> Result<()> {
        let stop = self.shared.stop_signal();
        let mut slot = self.slot.lock().await;
        if slot.removed {
            return Err(NetcatError::SessionNotFound(self.id()));
        }
        if !self.shared.status().can_start() {
            return Err(NetcatError::AlreadyRunning(self.id()));
        }
        // Leftovers from a runtime that failed on its own.
        self.release(&mut slot).await;

        let spec = &self.shared.spec;
        info!(
            session = %self.id(),
            protocol = %spec.protocol,
            mode = %spec.mode,
            endpoint = %spec.endpoint(),
            "starting session"
        );
        let opening = async {
            match (spec.protocol, spec.mode) {
                (Protocol::Tcp, SessionMode::Client) => {
                    self.shared.transition(SessionStatus::Connecting, None);
                    tcp_client::connect(&self.shared).await
                }
                (Protocol::Tcp, SessionMode::Server) => tcp_server::listen(&self.shared).await,
                (Protocol::Udp, SessionMode::Client) => udp::open_client(&self.shared).await,
                (Protocol::Udp, SessionMode::Server) => udp::bind_server(&self.shared).await,
            }
        };
        let opened = tokio::select! {
            biased;
            _ = stop.cancelled() => {
                info!(session = %self.id(), "start interrupted by stop");
                return Err(NetcatError::Cancelled(self.id()));
            }
            opened = opening => opened,
        };

        match opened {
            Ok(runtime) => {
                slot.runtime = Some(runtime);
                Ok(())
            }
            Err(e) => {
                self.shared.set_local_addr(None);
                self.shared
                    .transition(SessionStatus::Error, Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Closes every socket and moves the session to `disconnected`.
    /// Stopping a disconnected session does nothing.
    pub async fn stop(&self) -> Result<()> {
        self.shared.interrupt();
        let mut slot = self.slot.lock().await;
        if slot.removed {
            return Err(NetcatError::SessionNotFound(self.id()));
        }
        self.halt(&mut slot).await;
        Ok(())
    }

    /// Stops the session for good.  Later commands report it as not found.
    pub async fn remove(&self) {
        self.shared.interrupt();
        let mut slot = self.slot.lock().await;
        self.halt(&mut slot).await;
        slot.removed = true;
    }

    /// Encodes `request.data` and writes it.  Returns the record of the
    /// first completed write.
    pub async fn send(&self, request: SendRequest) -> Result<NetcatMessage> {
        let payload = encode_payload(&request.data, request.format)?;

        let stop = self.shared.stop_signal();
        let mut slot = self.slot.lock().await;
        if slot.removed {
            return Err(NetcatError::SessionNotFound(self.id()));
        }
        if !self.shared.status().accepts_traffic() {
            return Err(NetcatError::NotRunning(self.id()));
        }
        let runtime = slot
            .runtime
            .as_mut()
            .ok_or(NetcatError::NotRunning(self.id()))?;

        match runtime {
            Runtime::TcpClient { writer, .. } => {
                self.unless_stopped(&stop, writer.write_all(&payload)).await??;
                Ok(self.shared.record_sent(&payload, request.format, None))
            }
            Runtime::UdpClient { socket, .. } => {
                self.unless_stopped(&stop, socket.send(&payload)).await??;
                Ok(self.shared.record_sent(&payload, request.format, None))
            }
            Runtime::TcpServer { .. } => self.fan_out(&payload, &request, None, &stop).await,
            Runtime::UdpServer { socket, .. } => {
                self.fan_out(&payload, &request, Some(&**socket), &stop).await
            }
        }
    }

    /// Removes one peer from a server session's roster and closes its
    /// connection.
    pub async fn disconnect_client(&self, client_id: ClientId) -> Result<()> {
        let slot = self.slot.lock().await;
        if slot.removed {
            return Err(NetcatError::SessionNotFound(self.id()));
        }
        let entry = self
            .shared
            .remove_client(client_id)
            .ok_or(NetcatError::ClientNotFound(client_id))?;
        join_aborted(entry.task).await;
        Ok(())
    }

    async fn fan_out(
        &self,
        payload: &[u8],
        request: &SendRequest,
        udp_socket: Option<&UdpSocket>,
        stop: &CancellationToken,
    ) -> Result<NetcatMessage> {
        let targets = self
            .shared
            .resolve_targets(request.target_client_id, request.broadcast)?;

        let mut first = None;
        let mut last_error = None;
        for target in targets {
            let write = async {
                match (&target.link, udp_socket) {
                    (PeerLink::Tcp(writer), _) => writer.lock().await.write_all(payload).await,
                    (PeerLink::Udp, Some(socket)) => {
                        socket.send_to(payload, target.addr).await.map(|_| ())
                    }
                    (PeerLink::Udp, None) => Err(io::Error::new(
                        io::ErrorKind::NotConnected,
                        "no datagram socket for udp peer",
                    )),
                }
            };
            let written = self.unless_stopped(stop, write).await?;
            match written {
                Ok(()) => {
                    let message = self
                        .shared
                        .record_sent(payload, request.format, Some(target.addr));
                    first.get_or_insert(message);
                }
                Err(e) => {
                    warn!(
                        session = %self.id(),
                        client = %target.client_id,
                        addr = %target.addr,
                        error = %e,
                        "write to client failed"
                    );
                    if matches!(target.link, PeerLink::Tcp(_)) {
                        if let Some(entry) = self.shared.remove_client(target.client_id) {
                            join_aborted(entry.task).await;
                        }
                    }
                    last_error = Some(e);
                }
            }
        }

        match (first, last_error) {
            (Some(message), _) => Ok(message),
            (None, Some(e)) => Err(NetcatError::IoError(e)),
            (None, None) => Err(NetcatError::NoClients),
        }
    }

    /// Runs one network wait unless `stop` fires first.  The outer `Result`
    /// carries the interruption, the inner one the I/O outcome.
    async fn unless_stopped<T>(
        &self,
        stop: &CancellationToken,
        wait: impl Future<Output = io::Result<T>>,
    ) -> Result<io::Result<T>> {
        tokio::select! {
            biased;
            _ = stop.cancelled() => {
                info!(session = %self.id(), "send interrupted by stop");
                Err(NetcatError::Cancelled(self.id()))
            }
            done = wait => Ok(done),
        }
    }

    /// Tears down the runtime and roster, then settles on `disconnected`.
    async fn halt(&self, slot: &mut Slot) {
        self.release(slot).await;
        if self.shared.status() != SessionStatus::Disconnected {
            self.shared.transition(SessionStatus::Disconnected, None);
            info!(session = %self.id(), "session stopped");
        }
    }

    async fn release(&self, slot: &mut Slot) {
        if let Some(runtime) = slot.runtime.take() {
            runtime.shutdown().await;
        }
        let drained = self.shared.drain_roster();
        join_aborted(drained.into_iter().filter_map(|e| e.task)).await;
        self.shared.set_local_addr(None);
    }
}
