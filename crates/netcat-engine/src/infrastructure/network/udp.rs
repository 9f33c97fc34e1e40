//! UDP engines.
//!
//! - **Client**: an ephemeral socket `connect`ed to the target, so plain
//!   `send`/`recv` work and datagrams from other sources are filtered out by
//!   the kernel.
//! - **Server**: a socket bound to the configured endpoint.  Peers are
//!   identified by source address; the first datagram from an address adds
//!   it to the roster, and peers silent longer than the idle timeout are
//!   evicted.
//!
//! ICMP "port unreachable" replies surface on some platforms as
//! `ConnectionRefused`/`ConnectionReset` on the next receive.  Those are
//! logged and otherwise ignored: nothing is listening *yet* is normal for
//! UDP.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use netcat_core::SessionStatus;
use tokio::net::{lookup_host, UdpSocket};
use tracing::{debug, info, warn};

use crate::application::error::{NetcatError, Result};
use crate::infrastructure::network::session::{Runtime, SessionShared};

/// Largest possible UDP payload.
const MAX_DATAGRAM: usize = 65_535;

/// Floor on the idle-sweep period.
const MIN_SWEEP_PERIOD: Duration = Duration::from_millis(100);

// ── Client ────────────────────────────────────────────────────────────────────

/// Opens an ephemeral socket aimed at the session's target and spawns the
/// read task.
pub async fn open_client(shared: &Arc<SessionShared>) -> Result<Runtime> {
    let endpoint = shared.spec.endpoint();
    let target = resolve(shared).await?;

    let any: SocketAddr = if target.is_ipv6() {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(any)
        .await
        .map_err(|source| NetcatError::BindFailed {
            addr: any.to_string(),
            source,
        })?;
    socket
        .connect(target)
        .await
        .map_err(|e| NetcatError::ConnectFailed {
            addr: endpoint.clone(),
            reason: e.to_string(),
        })?;

    let socket = Arc::new(socket);
    shared.set_local_addr(socket.local_addr().ok());
    shared.transition(SessionStatus::Connected, None);
    info!(session = %shared.id, %endpoint, "udp client ready");

    let reader = tokio::spawn(client_reader(Arc::clone(shared), Arc::clone(&socket)));
    Ok(Runtime::UdpClient { socket, reader })
}

async fn resolve(shared: &SessionShared) -> Result<SocketAddr> {
    let endpoint = shared.spec.endpoint();
    let mut addrs = lookup_host((shared.spec.host.as_str(), shared.spec.port))
        .await
        .map_err(|e| NetcatError::ConnectFailed {
            addr: endpoint.clone(),
            reason: e.to_string(),
        })?;
    addrs.next().ok_or_else(|| NetcatError::ConnectFailed {
        addr: endpoint,
        reason: "host resolved to no addresses".to_string(),
    })
}

async fn client_reader(shared: Arc<SessionShared>, socket: Arc<UdpSocket>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        match socket.recv(&mut buf).await {
            Ok(n) => shared.record_received(&buf[..n], None),
            Err(e) if is_unreachable_notice(&e) => {
                debug!(session = %shared.id, error = %e, "peer not reachable");
            }
            Err(e) => {
                shared.fail(format!("receive failed: {e}"));
                return;
            }
        }
    }
}

// ── Server ────────────────────────────────────────────────────────────────────

/// Binds the session's endpoint, moves it to `listening` and spawns the
/// receive loop (and the idle sweeper when eviction is enabled).
pub async fn bind_server(shared: &Arc<SessionShared>) -> Result<Runtime> {
    let endpoint = shared.spec.endpoint();
    let socket = UdpSocket::bind((shared.spec.host.as_str(), shared.spec.port))
        .await
        .map_err(|source| NetcatError::BindFailed {
            addr: endpoint.clone(),
            source,
        })?;

    let socket = Arc::new(socket);
    shared.set_local_addr(socket.local_addr().ok());
    shared.transition(SessionStatus::Listening, None);
    info!(session = %shared.id, %endpoint, "udp server listening");

    let reader = tokio::spawn(server_reader(Arc::clone(shared), Arc::clone(&socket)));
    let sweeper = shared
        .settings
        .udp_idle_timeout()
        .map(|idle| tokio::spawn(sweep_idle_peers(Arc::clone(shared), idle)));
    Ok(Runtime::UdpServer {
        socket,
        reader,
        sweeper,
    })
}

async fn server_reader(shared: Arc<SessionShared>, socket: Arc<UdpSocket>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((n, peer)) => {
                shared.touch_udp_peer(peer);
                shared.record_received(&buf[..n], Some(peer));
            }
            Err(e) if is_unreachable_notice(&e) => {
                debug!(session = %shared.id, error = %e, "peer not reachable");
            }
            Err(e) => {
                warn!(session = %shared.id, error = %e, "udp server receive failed");
                shared.fail_server(format!("receive failed: {e}"));
                return;
            }
        }
    }
}

async fn sweep_idle_peers(shared: Arc<SessionShared>, idle: Duration) {
    let mut ticker = tokio::time::interval((idle / 2).max(MIN_SWEEP_PERIOD));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let evicted = shared.evict_idle_peers(idle);
        if evicted > 0 {
            debug!(session = %shared.id, evicted, "swept idle udp peers");
        }
    }
}

fn is_unreachable_notice(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset
    )
}
