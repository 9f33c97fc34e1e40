//! TCP client engine: one outbound stream, one read task.

use std::sync::Arc;

use netcat_core::SessionStatus;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::application::error::{NetcatError, Result};
use crate::infrastructure::network::reader::{pump_reads, ReadEnd};
use crate::infrastructure::network::session::{Runtime, SessionShared};

/// Connects within the configured timeout, moves the session to `connected`
/// and spawns the read task.
///
/// The caller has already moved the session to `connecting` and handles the
/// `error` transition if this fails.
pub async fn connect(shared: &Arc<SessionShared>) -> Result<Runtime> {
    let endpoint = shared.spec.endpoint();
    let limit = shared.settings.connect_timeout();
    let target = (shared.spec.host.as_str(), shared.spec.port);

    let stream = match timeout(limit, TcpStream::connect(target)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            return Err(NetcatError::ConnectFailed {
                addr: endpoint,
                reason: e.to_string(),
            })
        }
        Err(_) => {
            return Err(NetcatError::ConnectFailed {
                addr: endpoint,
                reason: format!("timed out after {} ms", limit.as_millis()),
            })
        }
    };

    if let Err(e) = stream.set_nodelay(true) {
        debug!(error = %e, "could not disable Nagle's algorithm");
    }
    let local = stream.local_addr().ok();
    let (read_half, writer) = stream.into_split();

    shared.set_local_addr(local);
    shared.transition(SessionStatus::Connected, None);
    info!(session = %shared.id, %endpoint, "tcp client connected");

    let reader = tokio::spawn(read_from_server(Arc::clone(shared), read_half));
    Ok(Runtime::TcpClient { writer, reader })
}

/// Logs everything the server sends.  When the server closes or the socket
/// fails, the session moves to `error`.
async fn read_from_server(shared: Arc<SessionShared>, read_half: tokio::net::tcp::OwnedReadHalf) {
    let end = pump_reads(read_half, shared.settings.read_buffer_size, |chunk| {
        shared.record_received(chunk, None)
    })
    .await;

    if let ReadEnd::Failed(e) = &end {
        debug!(session = %shared.id, error = %e, "tcp client read failed");
    }
    shared.fail(end.describe());
}
