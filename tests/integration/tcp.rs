//! TCP transport against a loopback server speaking the frame protocol

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::codec::Framed;

use athena_monitor::connection::{
    Connection, ConnectionError, DialOptions, Dialer, Endpoint, TcpConnection, TcpDialer,
};
use athena_monitor::health::{Monitor, MonitorConfig, ServerKind};
use athena_monitor::protocol::{handshake_commands, Command, Document, Frame, FrameCodec};

use crate::next_description;

/// How the loopback server treats a connection
#[derive(Clone, Copy)]
enum ServerMode {
    /// Answer every command
    Serve,
    /// Answer one handshake batch, then hang up
    HangUpAfterOneBatch,
}

struct TestServer {
    endpoint: Endpoint,
    accepted: Arc<AtomicUsize>,
}

fn reply_for(request: &Document) -> Document {
    let name = request
        .as_object()
        .and_then(|o| o.keys().next().cloned())
        .unwrap_or_default();
    match name.as_str() {
        "isMaster" => json!({
            "ok": 1,
            "ismaster": true,
            "setName": "rs0",
            "hosts": ["127.0.0.1:27017"],
            "maxWireVersion": 6
        }),
        "buildInfo" => json!({"ok": 1, "version": "3.6.2", "versionArray": [3, 6, 2, 0]}),
        _ => json!({"ok": 0, "code": 59, "errmsg": format!("no such command: '{}'", name)}),
    }
}

async fn spawn_server(mode: ServerMode) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let accepted = Arc::new(AtomicUsize::new(0));

    let counter = accepted.clone();
    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(v) => v,
                Err(_) => return,
            };
            counter.fetch_add(1, Ordering::SeqCst);

            tokio::spawn(async move {
                let mut framed = Framed::new(stream, FrameCodec);
                let mut answered = 0;
                while let Some(Ok(frame)) = framed.next().await {
                    let request: Document = serde_json::from_slice(&frame.payload).unwrap();
                    let reply = serde_json::to_vec(&reply_for(&request)).unwrap();
                    if framed.send(Frame::new(frame.request_id, reply)).await.is_err() {
                        return;
                    }
                    answered += 1;
                    if matches!(mode, ServerMode::HangUpAfterOneBatch) && answered == 2 {
                        return;
                    }
                }
            });
        }
    });

    TestServer {
        endpoint: Endpoint::new("127.0.0.1", port),
        accepted,
    }
}

fn tcp_config() -> MonitorConfig {
    MonitorConfig::default()
        .with_heartbeat_interval(Duration::from_secs(60))
        .with_dial_options(DialOptions {
            connect_timeout: Duration::from_secs(2),
            exchange_timeout: Duration::from_secs(2),
        })
}

#[tokio::test]
async fn test_monitor_over_tcp() {
    let server = spawn_server(ServerMode::Serve).await;
    let monitor = Monitor::start(server.endpoint.clone(), tcp_config()).unwrap();
    let (mut mailbox, _unsub) = monitor.subscribe().unwrap();
    next_description(&mut mailbox).await;

    let desc = next_description(&mut mailbox).await;
    assert!(desc.last_error().is_none(), "unexpected error: {:?}", desc.last_error());
    assert_eq!(desc.kind(), ServerKind::RsPrimary);
    let info = desc.info().unwrap();
    assert_eq!(info.version.desc, "3.6.2");
    assert_eq!(info.set_name.as_deref(), Some("rs0"));
    assert_eq!(server.accepted.load(Ordering::SeqCst), 1);

    monitor.shutdown().await;
}

#[tokio::test]
async fn test_refused_endpoint_is_unreachable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let monitor = Monitor::start(Endpoint::new("127.0.0.1", port), tcp_config()).unwrap();
    let (mut mailbox, _unsub) = monitor.subscribe().unwrap();
    next_description(&mut mailbox).await;

    let desc = next_description(&mut mailbox).await;
    assert!(matches!(desc.last_error(), Some(ConnectionError::Connect(_))));
    assert!(desc.info().is_none());

    monitor.shutdown().await;
}

#[tokio::test]
async fn test_dropped_connection_is_redialed() {
    let server = spawn_server(ServerMode::HangUpAfterOneBatch).await;
    let monitor = Monitor::start(server.endpoint.clone(), tcp_config()).unwrap();
    let (mut mailbox, _unsub) = monitor.subscribe().unwrap();
    next_description(&mut mailbox).await;

    let first = next_description(&mut mailbox).await;
    assert!(first.last_error().is_none());

    // The server hung up; the next heartbeat fails once, then redials
    monitor.request_immediate_check();
    let second = next_description(&mut mailbox).await;
    assert!(second.last_error().is_none(), "unexpected error: {:?}", second.last_error());
    assert_eq!(server.accepted.load(Ordering::SeqCst), 2);

    monitor.shutdown().await;
}

#[tokio::test]
async fn test_command_error_reply() {
    let server = spawn_server(ServerMode::Serve).await;
    let mut conn = TcpConnection::connect(&server.endpoint, &DialOptions::default())
        .await
        .unwrap();

    let result = conn.execute(&[Command::new("shutdown", "admin")]).await;
    match result {
        Err(ConnectionError::Command { code, message }) => {
            assert_eq!(code, 59);
            assert!(message.contains("shutdown"));
        }
        other => panic!("unexpected result: {:?}", other),
    }

    // A failed exchange leaves the connection unusable
    assert!(!conn.is_usable());
    conn.close().await;
    conn.close().await;
}

#[tokio::test]
async fn test_dialer_batches_handshake() {
    let server = spawn_server(ServerMode::Serve).await;
    let mut conn = TcpDialer
        .dial(&server.endpoint, &DialOptions::default())
        .await
        .unwrap();

    let replies = conn
        .execute(&handshake_commands())
        .await
        .unwrap();
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0]["ismaster"], true);
    assert_eq!(replies[1]["version"], "3.6.2");
    conn.close().await;
}
