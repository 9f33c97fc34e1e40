//! Process-wide event bus carrying session lifecycle and traffic events.
//!
//! Built on `tokio::sync::broadcast`: every subscriber gets its own bounded
//! view of the stream.  Publishing never blocks and never fails because of a
//! slow consumer.  A subscriber that falls more than `capacity` events behind
//! loses the oldest ones and is told how many via [`BusError::Lagged`].
//!
//! Events for one session are published while that session's state lock is
//! held, so they reach every subscriber in generation order.  No ordering is
//! promised across sessions.

use netcat_core::NetcatEvent;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::trace;

/// Default per-subscriber queue depth.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("event bus closed")]
    Closed,
    #[error("subscriber lagged behind by {0} events")]
    Lagged(u64),
}

/// Cloneable publishing handle.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<NetcatEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event.  Having no subscribers is not an error.
    pub fn publish(&self, event: NetcatEvent) {
        trace!(
            kind = event.kind(),
            session = %event.session_id(),
            "publishing event"
        );
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

/// Receiving end; dropping it unsubscribes without affecting any session.
pub struct EventSubscriber {
    rx: broadcast::Receiver<NetcatEvent>,
}

impl EventSubscriber {
    /// Waits for the next event.
    pub async fn recv(&mut self) -> Result<NetcatEvent, BusError> {
        self.rx.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => BusError::Closed,
            broadcast::error::RecvError::Lagged(n) => BusError::Lagged(n),
        })
    }

    /// Returns the next event if one is already queued.
    pub fn try_recv(&mut self) -> Result<Option<NetcatEvent>, BusError> {
        match self.rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Closed) => Err(BusError::Closed),
            Err(broadcast::error::TryRecvError::Lagged(n)) => Err(BusError::Lagged(n)),
        }
    }
}
