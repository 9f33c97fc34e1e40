//! Integration tests for TCP sessions over loopback.
//!
//! Each test drives a `SessionRegistry` through its public API exactly as the
//! command bridge does: create a server and one or more clients, exchange
//! bytes, and watch the event stream.  Every test uses its own port so they
//! can run in parallel.

mod common;

use std::sync::Arc;
use std::time::Duration;

use netcat_core::{DataFormat, Direction, NetcatEvent, Protocol, SessionMode, SessionStatus};
use netcat_engine::{EngineConfig, NetcatError, SendRequest, SessionRegistry};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::time::timeout;

use common::{config, poll_status, received_data, wait_for, wait_for_kind, wait_for_status};

// ── Happy path ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_tcp_client_and_server_exchange_bytes() {
    // Arrange
    let registry = SessionRegistry::default();
    let mut events = registry.subscribe();
    let server = registry
        .create(config(Protocol::Tcp, SessionMode::Server, 18080))
        .unwrap()
        .id;
    let client = registry
        .create(config(Protocol::Tcp, SessionMode::Client, 18080))
        .unwrap()
        .id;

    // Act: listen, then connect.
    let server_info = registry.start(server).await.unwrap();
    let client_info = registry.start(client).await.unwrap();

    // Assert: both running, one peer on the roster.
    assert_eq!(server_info.status, SessionStatus::Listening);
    assert_eq!(server_info.local_addr.as_deref(), Some("127.0.0.1:18080"));
    assert_eq!(client_info.status, SessionStatus::Connected);
    wait_for_kind(&mut events, server, "clientConnected").await;
    // Exactly one announcement for the one accepted peer.
    tokio::time::sleep(Duration::from_millis(100)).await;
    while let Some(event) = events.try_recv().unwrap() {
        assert!(
            !(event.session_id() == server && event.kind() == "clientConnected"),
            "peer announced twice"
        );
    }
    assert_eq!(registry.get_session(server).unwrap().client_count, 1);
    assert_eq!(registry.list_clients(server).unwrap().len(), 1);
    assert_eq!(registry.get_session(client).unwrap().client_count, 0);

    // Client → server, text.
    let sent = registry
        .send(client, SendRequest::new("Hello", DataFormat::Text))
        .await
        .unwrap();
    assert_eq!(sent.size, 5);
    assert_eq!(sent.direction, Direction::Sent);
    let got = wait_for_kind(&mut events, server, "messageReceived").await;
    assert_eq!(received_data(&got), "Hello");
    match &got {
        NetcatEvent::MessageReceived { message, .. } => {
            assert_eq!(message.size, 5);
            assert_eq!(message.format, DataFormat::Text);
            assert!(message.client_addr.is_some());
        }
        other => panic!("unexpected event {other:?}"),
    }

    // Server → client, hex, addressed to the only peer.
    let peer = registry.list_clients(server).unwrap()[0].id;
    let reply = registry
        .send(
            server,
            SendRequest::new("48 65 6C 6C 6F", DataFormat::Hex).to_client(peer),
        )
        .await
        .unwrap();
    assert_eq!(reply.size, 5);
    assert_eq!(reply.data, "48 65 6C 6C 6F");
    let echoed = wait_for_kind(&mut events, client, "messageReceived").await;
    assert_eq!(received_data(&echoed), "Hello");

    // Counters.
    let server_info = registry.get_session(server).unwrap();
    assert_eq!(server_info.bytes_received, 5);
    assert_eq!(server_info.bytes_sent, 5);
    assert_eq!(server_info.message_count, 2);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_list_messages_is_newest_first() {
    let registry = SessionRegistry::default();
    let mut events = registry.subscribe();
    let server = registry
        .create(config(Protocol::Tcp, SessionMode::Server, 18081))
        .unwrap()
        .id;
    let client = registry
        .create(config(Protocol::Tcp, SessionMode::Client, 18081))
        .unwrap()
        .id;
    registry.start(server).await.unwrap();
    registry.start(client).await.unwrap();

    for text in ["one", "two", "three"] {
        registry
            .send(client, SendRequest::new(text, DataFormat::Text))
            .await
            .unwrap();
    }

    let messages = registry.list_messages(client, 10).unwrap();
    let data: Vec<_> = messages.iter().map(|m| m.data.as_str()).collect();
    assert_eq!(data, vec!["three", "two", "one"]);
    assert_eq!(registry.list_messages(client, 1).unwrap().len(), 1);

    // Drain so the server has read something before shutdown.
    wait_for_kind(&mut events, server, "messageReceived").await;
    registry.shutdown().await;
}

// ── Send-path errors ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_invalid_payload_and_addressing_errors_leave_counters_alone() {
    let registry = SessionRegistry::default();
    let mut events = registry.subscribe();
    let server = registry
        .create(config(Protocol::Tcp, SessionMode::Server, 18082))
        .unwrap()
        .id;
    let client = registry
        .create(config(Protocol::Tcp, SessionMode::Client, 18082))
        .unwrap()
        .id;
    registry.start(server).await.unwrap();
    registry.start(client).await.unwrap();
    wait_for_kind(&mut events, server, "clientConnected").await;

    let bad_hex = registry
        .send(client, SendRequest::new("4G", DataFormat::Hex))
        .await;
    assert!(matches!(bad_hex, Err(NetcatError::EncodingError(_))));

    let odd_hex = registry
        .send(client, SendRequest::new("48 6", DataFormat::Hex))
        .await;
    assert!(matches!(odd_hex, Err(NetcatError::EncodingError(_))));

    let no_target = registry
        .send(server, SendRequest::new("hi", DataFormat::Text))
        .await;
    assert!(matches!(no_target, Err(NetcatError::MissingTarget)));

    let ghost = uuid::Uuid::new_v4();
    let unknown = registry
        .send(server, SendRequest::new("hi", DataFormat::Text).to_client(ghost))
        .await;
    assert!(matches!(unknown, Err(NetcatError::ClientNotFound(id)) if id == ghost));

    for id in [server, client] {
        let info = registry.get_session(id).unwrap();
        assert_eq!(info.bytes_sent, 0);
        assert_eq!(info.message_count, 0);
        assert!(info.status.accepts_traffic());
    }

    registry.shutdown().await;
}

// ── Broadcast and kick ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_broadcast_writes_to_every_peer() {
    let registry = SessionRegistry::default();
    let mut events = registry.subscribe();
    let server = registry
        .create(config(Protocol::Tcp, SessionMode::Server, 18083))
        .unwrap()
        .id;
    registry.start(server).await.unwrap();

    let mut clients = Vec::new();
    for _ in 0..2 {
        let id = registry
            .create(config(Protocol::Tcp, SessionMode::Client, 18083))
            .unwrap()
            .id;
        registry.start(id).await.unwrap();
        wait_for_kind(&mut events, server, "clientConnected").await;
        clients.push(id);
    }

    let first = registry
        .send(server, SendRequest::new("ping", DataFormat::Text).to_all())
        .await
        .unwrap();

    assert_eq!(first.size, 4);
    let info = registry.get_session(server).unwrap();
    assert_eq!(info.bytes_sent, 8);
    assert_eq!(info.message_count, 2);
    let mut pending = clients.clone();
    while !pending.is_empty() {
        let got = tokio::time::timeout(common::WAIT, events.recv())
            .await
            .expect("timed out waiting for broadcast")
            .unwrap();
        if let NetcatEvent::MessageReceived { session_id, message } = got {
            if let Some(pos) = pending.iter().position(|id| *id == session_id) {
                assert_eq!(message.data, "ping");
                pending.remove(pos);
            }
        }
    }

    registry.shutdown().await;
}

#[tokio::test]
async fn test_broadcast_with_empty_roster_is_no_clients() {
    let registry = SessionRegistry::default();
    let server = registry
        .create(config(Protocol::Tcp, SessionMode::Server, 18084))
        .unwrap()
        .id;
    registry.start(server).await.unwrap();

    let result = registry
        .send(server, SendRequest::new("ping", DataFormat::Text).to_all())
        .await;

    assert!(matches!(result, Err(NetcatError::NoClients)));
    registry.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_client_closes_peer_connection() {
    let registry = SessionRegistry::default();
    let mut events = registry.subscribe();
    let server = registry
        .create(config(Protocol::Tcp, SessionMode::Server, 18085))
        .unwrap()
        .id;
    let client = registry
        .create(config(Protocol::Tcp, SessionMode::Client, 18085))
        .unwrap()
        .id;
    registry.start(server).await.unwrap();
    registry.start(client).await.unwrap();
    wait_for_kind(&mut events, server, "clientConnected").await;
    let peer = registry.list_clients(server).unwrap()[0].id;

    registry.disconnect_client(server, peer).await.unwrap();

    let gone = wait_for_kind(&mut events, server, "clientDisconnected").await;
    assert!(matches!(gone, NetcatEvent::ClientDisconnected { client_id, .. } if client_id == peer));
    assert!(registry.list_clients(server).unwrap().is_empty());
    assert_eq!(registry.get_session(server).unwrap().status, SessionStatus::Listening);

    // The client side sees the close as a failure of its connection.
    poll_status(&registry, client, SessionStatus::Error).await;
    let client_info = registry.get_session(client).unwrap();
    assert!(client_info.error_message.is_some());

    let again = registry.disconnect_client(server, peer).await;
    assert!(matches!(again, Err(NetcatError::ClientNotFound(_))));

    registry.shutdown().await;
}

// ── Lifecycle ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_stop_server_clears_roster_and_notifies_peers() {
    let registry = SessionRegistry::default();
    let mut events = registry.subscribe();
    let server = registry
        .create(config(Protocol::Tcp, SessionMode::Server, 18086))
        .unwrap()
        .id;
    let client = registry
        .create(config(Protocol::Tcp, SessionMode::Client, 18086))
        .unwrap()
        .id;
    registry.start(server).await.unwrap();
    registry.start(client).await.unwrap();
    wait_for_kind(&mut events, server, "clientConnected").await;

    let stopped = registry.stop(server).await.unwrap();

    assert_eq!(stopped.status, SessionStatus::Disconnected);
    assert_eq!(stopped.client_count, 0);
    assert!(stopped.local_addr.is_none());
    wait_for_kind(&mut events, server, "clientDisconnected").await;
    wait_for_status(&mut events, server, SessionStatus::Disconnected).await;
    poll_status(&registry, client, SessionStatus::Error).await;

    // Sending on the failed client is refused; stopping it recovers.
    let refused = registry
        .send(client, SendRequest::new("late", DataFormat::Text))
        .await;
    assert!(matches!(refused, Err(NetcatError::NotRunning(_))));
    let recovered = registry.stop(client).await.unwrap();
    assert_eq!(recovered.status, SessionStatus::Disconnected);
    assert!(recovered.error_message.is_none());

    // Second stop is a no-op.
    assert_eq!(
        registry.stop(server).await.unwrap().status,
        SessionStatus::Disconnected
    );

    // The port is free again.
    let restarted = registry.start(server).await.unwrap();
    assert_eq!(restarted.status, SessionStatus::Listening);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_clear_messages_keeps_message_count() {
    let registry = SessionRegistry::default();
    let mut events = registry.subscribe();
    let server = registry
        .create(config(Protocol::Tcp, SessionMode::Server, 18087))
        .unwrap()
        .id;
    let client = registry
        .create(config(Protocol::Tcp, SessionMode::Client, 18087))
        .unwrap()
        .id;
    registry.start(server).await.unwrap();
    registry.start(client).await.unwrap();
    registry
        .send(client, SendRequest::new("abc", DataFormat::Text))
        .await
        .unwrap();
    wait_for_kind(&mut events, server, "messageReceived").await;

    registry.clear_messages(server).unwrap();

    assert!(registry.list_messages(server, 50).unwrap().is_empty());
    let info = registry.get_session(server).unwrap();
    assert_eq!(info.message_count, 1);
    assert_eq!(info.bytes_received, 3);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_start_running_session_is_already_running() {
    let registry = SessionRegistry::default();
    let server = registry
        .create(config(Protocol::Tcp, SessionMode::Server, 18088))
        .unwrap()
        .id;
    registry.start(server).await.unwrap();

    let again = registry.start(server).await;

    assert!(matches!(again, Err(NetcatError::AlreadyRunning(id)) if id == server));
    registry.shutdown().await;
}

#[tokio::test]
async fn test_remove_running_session_releases_port() {
    let registry = SessionRegistry::default();
    let server = registry
        .create(config(Protocol::Tcp, SessionMode::Server, 18089))
        .unwrap()
        .id;
    registry.start(server).await.unwrap();

    registry.remove(server).await.unwrap();

    assert!(matches!(
        registry.get_session(server),
        Err(NetcatError::SessionNotFound(_))
    ));
    let replacement = registry
        .create(config(Protocol::Tcp, SessionMode::Server, 18089))
        .unwrap()
        .id;
    let info = registry.start(replacement).await.unwrap();
    assert_eq!(info.status, SessionStatus::Listening);

    registry.shutdown().await;
}

// ── Start failures ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_bind_conflict_moves_session_to_error() {
    let registry = SessionRegistry::default();
    let mut events = registry.subscribe();
    let first = registry
        .create(config(Protocol::Tcp, SessionMode::Server, 18090))
        .unwrap()
        .id;
    let second = registry
        .create(config(Protocol::Tcp, SessionMode::Server, 18090))
        .unwrap()
        .id;
    registry.start(first).await.unwrap();

    let err = registry.start(second).await.unwrap_err();

    assert!(matches!(err, NetcatError::BindFailed { .. }));
    let info = registry.get_session(second).unwrap();
    assert_eq!(info.status, SessionStatus::Error);
    assert!(info.error_message.is_some());
    let event = wait_for_status(&mut events, second, SessionStatus::Error).await;
    assert!(matches!(
        event,
        NetcatEvent::StatusChanged { error_message: Some(_), .. }
    ));

    // A retry after the port frees up succeeds straight from `error`.
    registry.stop(first).await.unwrap();
    let retried = registry.start(second).await.unwrap();
    assert_eq!(retried.status, SessionStatus::Listening);
    assert!(retried.error_message.is_none());

    registry.shutdown().await;
}

#[tokio::test]
async fn test_connect_refused_moves_client_to_error() {
    let registry = SessionRegistry::default();
    let mut events = registry.subscribe();
    let client = registry
        .create(config(Protocol::Tcp, SessionMode::Client, 18091))
        .unwrap()
        .id;

    let err = registry.start(client).await.unwrap_err();

    assert!(matches!(err, NetcatError::ConnectFailed { .. }));
    wait_for_status(&mut events, client, SessionStatus::Connecting).await;
    let failed = wait_for(&mut events, client, |e| {
        matches!(e, NetcatEvent::StatusChanged { status: SessionStatus::Error, .. })
    })
    .await;
    assert!(matches!(
        failed,
        NetcatEvent::StatusChanged { error_message: Some(_), .. }
    ));
    assert_eq!(registry.get_session(client).unwrap().status, SessionStatus::Error);
}

// ── Stop during network waits ─────────────────────────────────────────────────

/// Big enough that loopback socket buffers cannot absorb it.
const FLOOD_BYTES: usize = 64 * 1024 * 1024;

#[tokio::test]
async fn test_stop_interrupts_send_to_server_that_never_reads() {
    // Arrange: a listener that accepts and then never reads.
    let listener = TcpListener::bind("127.0.0.1:18092").await.unwrap();
    let silent = tokio::spawn(async move {
        let (_stream, _) = listener.accept().await.unwrap();
        std::future::pending::<()>().await
    });
    let registry = Arc::new(SessionRegistry::default());
    let client = registry
        .create(config(Protocol::Tcp, SessionMode::Client, 18092))
        .unwrap()
        .id;
    registry.start(client).await.unwrap();
    let sender = {
        let registry = Arc::clone(&registry);
        let flood = "x".repeat(FLOOD_BYTES);
        tokio::spawn(async move {
            registry
                .send(client, SendRequest::new(flood, DataFormat::Text))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(300)).await;

    // Act
    let stopped = timeout(Duration::from_secs(2), registry.stop(client))
        .await
        .expect("stop waited on a stalled write")
        .unwrap();

    // Assert
    assert_eq!(stopped.status, SessionStatus::Disconnected);
    let sent = sender.await.unwrap();
    assert!(matches!(sent, Err(NetcatError::Cancelled(id)) if id == client));
    assert_eq!(stopped.message_count, 0);
    assert_eq!(stopped.bytes_sent, 0);

    silent.abort();
    registry.shutdown().await;
}

#[tokio::test]
async fn test_stop_interrupts_broadcast_to_peer_that_never_reads() {
    let registry = Arc::new(SessionRegistry::default());
    let mut events = registry.subscribe();
    let server = registry
        .create(config(Protocol::Tcp, SessionMode::Server, 18093))
        .unwrap()
        .id;
    registry.start(server).await.unwrap();
    let _silent_peer = TcpStream::connect("127.0.0.1:18093").await.unwrap();
    wait_for_kind(&mut events, server, "clientConnected").await;

    let sender = {
        let registry = Arc::clone(&registry);
        let flood = "x".repeat(FLOOD_BYTES);
        tokio::spawn(async move {
            registry
                .send(server, SendRequest::new(flood, DataFormat::Text).to_all())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(300)).await;

    let stopped = timeout(Duration::from_secs(2), registry.stop(server))
        .await
        .expect("stop waited on a stalled broadcast")
        .unwrap();

    assert_eq!(stopped.status, SessionStatus::Disconnected);
    assert_eq!(stopped.client_count, 0);
    assert!(matches!(
        sender.await.unwrap(),
        Err(NetcatError::Cancelled(id)) if id == server
    ));
    registry.shutdown().await;
}

#[tokio::test]
async fn test_stop_while_connecting_cancels_the_connect() {
    // Arrange: fill a backlog-1 listener that never accepts, so the next
    // SYN goes unanswered.
    let socket = TcpSocket::new_v4().unwrap();
    socket.bind("127.0.0.1:18094".parse().unwrap()).unwrap();
    let _listener = socket.listen(1).unwrap();
    let mut fillers = Vec::new();
    for _ in 0..4 {
        if let Ok(Ok(stream)) =
            timeout(Duration::from_millis(200), TcpStream::connect("127.0.0.1:18094")).await
        {
            fillers.push(stream);
        }
    }

    let registry = Arc::new(SessionRegistry::new(EngineConfig {
        connect_timeout_ms: 4_000,
        ..EngineConfig::default()
    }));
    let mut events = registry.subscribe();
    let client = registry
        .create(config(Protocol::Tcp, SessionMode::Client, 18094))
        .unwrap()
        .id;
    let starter = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.start(client).await })
    };
    wait_for_status(&mut events, client, SessionStatus::Connecting).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Act
    let stopped = timeout(Duration::from_secs(1), registry.stop(client))
        .await
        .expect("stop waited out the connect timeout")
        .unwrap();

    // Assert
    assert_eq!(stopped.status, SessionStatus::Disconnected);
    assert!(stopped.error_message.is_none());
    assert!(matches!(
        starter.await.unwrap(),
        Err(NetcatError::Cancelled(id)) if id == client
    ));
    wait_for_status(&mut events, client, SessionStatus::Disconnected).await;
    registry.shutdown().await;
}
