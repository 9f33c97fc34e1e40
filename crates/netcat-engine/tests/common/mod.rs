//! Helpers shared by the loopback integration tests.

#![allow(dead_code)]

use std::time::Duration;

use netcat_core::{NetcatEvent, Protocol, SessionConfig, SessionId, SessionMode, SessionStatus};
use netcat_engine::{EventSubscriber, SessionRegistry};
use tokio::time::timeout;

/// Upper bound on any single event wait.
pub const WAIT: Duration = Duration::from_secs(5);

pub fn config(protocol: Protocol, mode: SessionMode, port: u32) -> SessionConfig {
    SessionConfig::new(protocol, mode, "127.0.0.1", port)
}

/// Returns the next event for `session` that satisfies `pred`, skipping
/// everything else.  Panics after [`WAIT`].
pub async fn wait_for<F>(sub: &mut EventSubscriber, session: SessionId, pred: F) -> NetcatEvent
where
    F: Fn(&NetcatEvent) -> bool,
{
    timeout(WAIT, async {
        loop {
            let event = sub.recv().await.expect("event bus closed or lagged");
            if event.session_id() == session && pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

pub async fn wait_for_status(
    sub: &mut EventSubscriber,
    session: SessionId,
    status: SessionStatus,
) -> NetcatEvent {
    wait_for(sub, session, |e| {
        matches!(e, NetcatEvent::StatusChanged { status: s, .. } if *s == status)
    })
    .await
}

pub async fn wait_for_kind(
    sub: &mut EventSubscriber,
    session: SessionId,
    kind: &'static str,
) -> NetcatEvent {
    wait_for(sub, session, |e| e.kind() == kind).await
}

/// Payload text of a `messageReceived` event.
pub fn received_data(event: &NetcatEvent) -> &str {
    match event {
        NetcatEvent::MessageReceived { message, .. } => &message.data,
        other => panic!("expected messageReceived, got {other:?}"),
    }
}

/// Polls `registry` until `session` reaches `status`.  Used where the
/// relative order of two sessions' events is not defined.
pub async fn poll_status(registry: &SessionRegistry, session: SessionId, status: SessionStatus) {
    timeout(WAIT, async {
        loop {
            if registry.get_session(session).ok().map(|s| s.status) == Some(status) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("timed out waiting for status")
}
