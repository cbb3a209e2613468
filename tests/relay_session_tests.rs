//! Integration tests for the relay service.
//!
//! Each test stands up the relay in-process against a scripted mock upstream
//! WebSocket server and drives it with a real client connection, verifying
//! session pairing, one-time configuration injection, verbatim forwarding,
//! and symmetric teardown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use parla_gateway::routes::relay::create_relay_router;
use parla_gateway::{AppState, ServerConfig};

const WAIT: Duration = Duration::from_secs(5);

type ClientWs = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct MockUpstream {
    addr: SocketAddr,
    /// Text frames the mock received, in order.
    received: Arc<Mutex<Vec<String>>>,
    /// Total connections accepted.
    connections: Arc<AtomicUsize>,
    /// Notified whenever one upstream connection's read loop ends.
    closed: Arc<Notify>,
}

impl MockUpstream {
    fn session_updates(&self) -> usize {
        self.received
            .lock()
            .iter()
            .filter_map(|raw| serde_json::from_str::<Value>(raw).ok())
            .filter(|v| v["type"] == "session.update")
            .count()
    }
}

/// Scripted upstream: announces `session.created` on connect, optionally
/// pushes extra frames, then either drops the connection or records whatever
/// arrives.
async fn spawn_mock_upstream(drop_after_created: bool, extra_frames: Vec<String>) -> MockUpstream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let received = Arc::new(Mutex::new(Vec::new()));
    let connections = Arc::new(AtomicUsize::new(0));
    let closed = Arc::new(Notify::new());

    let accept_received = received.clone();
    let accept_connections = connections.clone();
    let accept_closed = closed.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            accept_connections.fetch_add(1, Ordering::SeqCst);
            let received = accept_received.clone();
            let closed = accept_closed.clone();
            let extra_frames = extra_frames.clone();
            tokio::spawn(async move {
                let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                let created = json!({"type": "session.created", "session": {"id": "sess_mock"}});
                ws.send(Message::Text(created.to_string().into()))
                    .await
                    .unwrap();
                for frame in extra_frames {
                    ws.send(Message::Text(frame.into())).await.unwrap();
                }
                if drop_after_created {
                    drop(ws);
                    closed.notify_one();
                    return;
                }
                while let Some(Ok(message)) = ws.next().await {
                    match message {
                        Message::Text(text) => received.lock().push(text.as_str().to_owned()),
                        Message::Close(_) => break,
                        _ => {}
                    }
                }
                closed.notify_one();
            });
        }
    });

    MockUpstream {
        addr,
        received,
        connections,
        closed,
    }
}

fn test_config(upstream_addr: SocketAddr, max_sessions: usize) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        upstream_url: format!("ws://{upstream_addr}/realtime"),
        upstream_model: "test-realtime-model".to_string(),
        upstream_api_key: "sk-test".to_string(),
        max_sessions,
        cors_allowed_origins: None,
    }
}

async fn spawn_relay(state: Arc<AppState>) -> SocketAddr {
    let app = Router::new().merge(create_relay_router()).with_state(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });
    addr
}

async fn connect_client(relay_addr: SocketAddr) -> ClientWs {
    let (ws, _) = timeout(WAIT, connect_async(format!("ws://{relay_addr}/realtime")))
        .await
        .expect("client connect timed out")
        .expect("client connect failed");
    ws
}

/// Read text frames until one parses with the wanted `type`, skipping others.
async fn expect_event(ws: &mut ClientWs, wanted: &str) -> Value {
    loop {
        let frame = timeout(WAIT, ws.next())
            .await
            .expect("read timed out")
            .expect("connection ended")
            .expect("transport error");
        if let Message::Text(text) = frame {
            if let Ok(value) = serde_json::from_str::<Value>(text.as_str()) {
                if value["type"] == wanted {
                    return value;
                }
            }
        }
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not reached within the teardown window");
}

#[tokio::test]
async fn test_session_pairing_and_one_time_config_injection() {
    let upstream = spawn_mock_upstream(false, Vec::new()).await;
    let state = AppState::new(test_config(upstream.addr, 4));
    let relay_addr = spawn_relay(state).await;

    let mut client = connect_client(relay_addr).await;

    // Exactly one upstream connection per accepted inbound connection.
    wait_until(|| upstream.connections.load(Ordering::SeqCst) == 1).await;

    // The session handshake passes through to the client verbatim.
    let created = expect_event(&mut client, "session.created").await;
    assert_eq!(created["session"]["id"], "sess_mock");

    // The relay's first frame upstream is the injected configuration -
    // strictly after session.created, since the mock only starts reading
    // after announcing it.
    wait_until(|| !upstream.received.lock().is_empty()).await;
    {
        let received = upstream.received.lock();
        let first: Value = serde_json::from_str(&received[0]).unwrap();
        assert_eq!(first["type"], "session.update");
        assert_eq!(first["session"]["voice"], "alloy");
        assert_eq!(first["session"]["turn_detection"]["type"], "server_vad");
        assert_eq!(first["session"]["input_audio_format"], "pcm16");
    }

    // More traffic never triggers a second injection.
    let append = json!({"type": "input_audio_buffer.append", "audio": "AAEC"});
    client
        .send(Message::Text(append.to_string().into()))
        .await
        .unwrap();
    wait_until(|| upstream.received.lock().len() >= 2).await;
    assert_eq!(upstream.session_updates(), 1);

    let received = upstream.received.lock();
    let forwarded: Value = serde_json::from_str(&received[1]).unwrap();
    assert_eq!(forwarded, append);
}

#[tokio::test]
async fn test_frames_forwarded_verbatim_without_validation() {
    let unknown = json!({"type": "response.brand_new_event", "payload": 7}).to_string();
    let upstream = spawn_mock_upstream(false, vec![unknown.clone(), "not json".to_string()]).await;
    let state = AppState::new(test_config(upstream.addr, 4));
    let relay_addr = spawn_relay(state).await;

    let mut client = connect_client(relay_addr).await;

    // Unknown event types and malformed frames both reach the client intact.
    expect_event(&mut client, "session.created").await;
    let forwarded = expect_event(&mut client, "response.brand_new_event").await;
    assert_eq!(forwarded["payload"], 7);

    let mut saw_malformed = false;
    for _ in 0..5 {
        if let Ok(Some(Ok(Message::Text(text)))) = timeout(WAIT, client.next()).await {
            if text.as_str() == "not json" {
                saw_malformed = true;
                break;
            }
        }
    }
    assert!(saw_malformed, "malformed frame was not forwarded");

    // Malformed client frames are forwarded too; schema is not the relay's
    // problem.
    client
        .send(Message::Text("also not json".to_string().into()))
        .await
        .unwrap();
    wait_until(|| {
        upstream
            .received
            .lock()
            .iter()
            .any(|raw| raw == "also not json")
    })
    .await;
}

#[tokio::test]
async fn test_upstream_drop_closes_client_within_window() {
    let upstream = spawn_mock_upstream(true, Vec::new()).await;
    let state = AppState::new(test_config(upstream.addr, 4));
    let relay_addr = spawn_relay(state.clone()).await;

    let mut client = connect_client(relay_addr).await;

    // After the upstream resets, the client connection must end within the
    // bounded teardown window; no frames follow.
    let ended = timeout(WAIT, async {
        loop {
            match client.next().await {
                None => break,
                Some(Ok(Message::Close(_))) => break,
                Some(Err(_)) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(ended.is_ok(), "client connection outlived the upstream");

    wait_until(|| state.active_sessions() == 0).await;
}

#[tokio::test]
async fn test_client_close_tears_down_upstream() {
    let upstream = spawn_mock_upstream(false, Vec::new()).await;
    let state = AppState::new(test_config(upstream.addr, 4));
    let relay_addr = spawn_relay(state.clone()).await;

    let mut client = connect_client(relay_addr).await;
    expect_event(&mut client, "session.created").await;

    client.close(None).await.unwrap();

    // The upstream leg must observe the closure within the bounded window.
    timeout(WAIT, upstream.closed.notified())
        .await
        .expect("upstream leg was not closed");
    wait_until(|| state.active_sessions() == 0).await;
}

#[tokio::test]
async fn test_non_upgrade_request_is_rejected() {
    use http::Request;
    use tower::util::ServiceExt;

    let upstream = spawn_mock_upstream(false, Vec::new()).await;
    let state = AppState::new(test_config(upstream.addr, 4));
    let app = Router::new()
        .merge(create_relay_router())
        .with_state(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/realtime")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_client_error());
    assert_eq!(upstream.connections.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_at_capacity_rejects_with_503() {
    let upstream = spawn_mock_upstream(false, Vec::new()).await;
    let state = AppState::new(test_config(upstream.addr, 1));
    let relay_addr = spawn_relay(state.clone()).await;

    let mut first = connect_client(relay_addr).await;
    expect_event(&mut first, "session.created").await;

    // Second session while the only slot is taken: refused before upgrade.
    let refused = connect_async(format!("ws://{relay_addr}/realtime")).await;
    match refused {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), 503);
        }
        other => panic!("expected HTTP 503 rejection, got {other:?}"),
    }

    // Slot is returned on teardown and a new session is admitted.
    first.close(None).await.unwrap();
    wait_until(|| state.active_sessions() == 0).await;
    let mut second = connect_client(relay_addr).await;
    expect_event(&mut second, "session.created").await;
}
