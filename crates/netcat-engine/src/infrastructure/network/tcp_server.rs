//! TCP server engine: accept loop plus one read task per peer.
//!
//! A peer's EOF or read error removes that peer from the roster and nothing
//! else.  The session stays `listening` until it is stopped or the listener
//! itself fails, which takes every peer down with it.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use netcat_core::{ClientId, SessionStatus};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::application::error::{NetcatError, Result};
use crate::infrastructure::network::reader::{pump_reads, ReadEnd};
use crate::infrastructure::network::session::{PeerLink, Runtime, SessionShared};

/// Binds the listener, moves the session to `listening` and spawns the
/// accept loop.
pub async fn listen(shared: &Arc<SessionShared>) -> Result<Runtime> {
    let endpoint = shared.spec.endpoint();
    let listener = TcpListener::bind((shared.spec.host.as_str(), shared.spec.port))
        .await
        .map_err(|source| NetcatError::BindFailed {
            addr: endpoint.clone(),
            source,
        })?;

    let local = listener.local_addr().ok();
    shared.set_local_addr(local);
    shared.transition(SessionStatus::Listening, None);
    info!(session = %shared.id, %endpoint, "tcp server listening");

    let acceptor = tokio::spawn(accept_loop(Arc::clone(shared), listener));
    Ok(Runtime::TcpServer { acceptor })
}

async fn accept_loop(shared: Arc<SessionShared>, listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(%peer, error = %e, "could not disable Nagle's algorithm");
                }
                let (read_half, write_half) = stream.into_split();
                let link = PeerLink::Tcp(Arc::new(tokio::sync::Mutex::new(write_half)));
                let client = shared.admit_client(peer, link);
                let task = tokio::spawn(serve_client(
                    Arc::clone(&shared),
                    client.id,
                    peer,
                    read_half,
                ));
                shared.attach_client_task(client.id, task);
            }
            Err(e) if is_per_connection(&e) => {
                warn!(session = %shared.id, error = %e, "accept failed for one connection");
            }
            Err(e) => {
                error!(session = %shared.id, error = %e, "listener failed");
                shared.fail_server(format!("accept failed: {e}"));
                return;
            }
        }
    }
}

/// Errors that concern only the connection being accepted.
fn is_per_connection(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

async fn serve_client(
    shared: Arc<SessionShared>,
    client_id: ClientId,
    peer: SocketAddr,
    read_half: OwnedReadHalf,
) {
    let end = pump_reads(read_half, shared.settings.read_buffer_size, |chunk| {
        shared.record_received(chunk, Some(peer))
    })
    .await;

    match &end {
        ReadEnd::Eof => debug!(session = %shared.id, %peer, "client closed connection"),
        ReadEnd::Failed(e) => warn!(session = %shared.id, %peer, error = %e, "client read failed"),
    }
    shared.remove_client(client_id);
}
