use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{CloseFrame, Message as ClientMessage, Utf8Bytes, WebSocket, WebSocketUpgrade, close_code};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Duration, timeout};
use tokio_tungstenite::tungstenite::Message as UpstreamMessage;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as UpstreamCloseFrame;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::realtime::{self, ClientEvent, UpstreamStream, peek_event_type, session_config};
use crate::state::{AppState, SessionGuard};

/// Maximum WebSocket frame size (10 MB)
const MAX_WS_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Maximum WebSocket message size (10 MB)
const MAX_WS_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Buffered frames toward the upstream writer
const UPSTREAM_CHANNEL_CAPACITY: usize = 1024;

/// A send stalled longer than this on either leg is fatal to the session.
const FORWARD_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Relay WebSocket handler
///
/// Upgrades the HTTP connection and bridges it to the upstream realtime
/// service. Requests without the WebSocket upgrade capability are rejected by
/// the extractor before this body runs.
pub async fn relay_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    let guard = match AppState::try_acquire_session(&state) {
        Ok(guard) => guard,
        Err(_) => {
            warn!(
                active = state.active_sessions(),
                limit = state.config.max_sessions,
                "rejecting session: server at capacity"
            );
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                "Server at capacity. Please try again later.",
            )
                .into_response();
        }
    };

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_relay_socket(socket, state, guard))
}

/// Drive one relay session to completion.
async fn handle_relay_socket(mut socket: WebSocket, state: Arc<AppState>, _guard: SessionGuard) {
    let session_id = Uuid::new_v4();
    info!(%session_id, "relay session opened");

    let endpoint = state.config.upstream_endpoint();
    let upstream =
        match realtime::connect_upstream(&endpoint, &state.config.upstream_api_key).await {
            Ok(stream) => stream,
            Err(e) => {
                error!(%session_id, error = %e, "upstream connect failed");
                let _ = socket
                    .send(ClientMessage::Close(Some(CloseFrame {
                        code: close_code::ERROR,
                        reason: Utf8Bytes::from_static("upstream unavailable"),
                    })))
                    .await;
                return;
            }
        };

    let (client_sink, client_stream) = socket.split();
    let (upstream_sink, upstream_stream) = upstream.split();

    // One writer owns the upstream sink so forwarded client frames and the
    // injected configuration frame serialize onto a single ordered stream.
    let (up_tx, up_rx) = mpsc::channel::<UpstreamMessage>(UPSTREAM_CHANNEL_CAPACITY);
    let mut writer = tokio::spawn(upstream_writer(upstream_sink, up_rx, session_id));

    let mut c2u = tokio::spawn(forward_client_to_upstream(
        client_stream,
        up_tx.clone(),
        session_id,
    ));
    let mut u2c = tokio::spawn(forward_upstream_to_client(
        upstream_stream,
        client_sink,
        up_tx,
        session_id,
    ));

    // Whichever leg finishes first ends the session; the remaining tasks are
    // aborted so neither side is left half-open.
    tokio::select! {
        _ = &mut c2u => debug!(%session_id, "client leg finished first"),
        _ = &mut u2c => debug!(%session_id, "upstream leg finished first"),
        _ = &mut writer => debug!(%session_id, "upstream writer finished first"),
    }

    c2u.abort();
    u2c.abort();
    writer.abort();

    info!(%session_id, "relay session closed");
}

/// Owns the upstream sink; drains the channel until either side goes away.
async fn upstream_writer(
    mut sink: SplitSink<UpstreamStream, UpstreamMessage>,
    mut rx: mpsc::Receiver<UpstreamMessage>,
    session_id: Uuid,
) {
    while let Some(message) = rx.recv().await {
        let is_close = matches!(message, UpstreamMessage::Close(_));
        match timeout(FORWARD_SEND_TIMEOUT, sink.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(%session_id, error = %e, "upstream send failed");
                break;
            }
            Err(_) => {
                warn!(%session_id, "upstream send stalled, tearing down session");
                break;
            }
        }
        if is_close {
            break;
        }
    }
}

/// Forward client frames toward the upstream, verbatim.
async fn forward_client_to_upstream(
    mut client_stream: SplitStream<WebSocket>,
    up_tx: mpsc::Sender<UpstreamMessage>,
    session_id: Uuid,
) {
    while let Some(frame) = client_stream.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                debug!(%session_id, error = %e, "client transport error");
                let _ = up_tx.send(UpstreamMessage::Close(None)).await;
                return;
            }
        };

        let Some(outbound) = client_frame_to_upstream(frame) else {
            continue;
        };
        let is_close = matches!(outbound, UpstreamMessage::Close(_));
        if up_tx.send(outbound).await.is_err() {
            // Writer is gone; the session is already tearing down.
            return;
        }
        if is_close {
            return;
        }
    }

    // Client stream ended without a close frame; tell the upstream anyway.
    let _ = up_tx.send(UpstreamMessage::Close(None)).await;
}

/// Forward upstream frames toward the client, verbatim, injecting the session
/// configuration exactly once when `session.created` is observed.
async fn forward_upstream_to_client(
    mut upstream_stream: SplitStream<UpstreamStream>,
    mut client_sink: SplitSink<WebSocket, ClientMessage>,
    up_tx: mpsc::Sender<UpstreamMessage>,
    session_id: Uuid,
) {
    let mut config_injected = false;

    while let Some(frame) = upstream_stream.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                warn!(%session_id, error = %e, "upstream transport error");
                break;
            }
        };

        if !config_injected
            && let UpstreamMessage::Text(text) = &frame
            && peek_event_type(text.as_str()).as_deref() == Some("session.created")
        {
            match session_update_frame() {
                Ok(update) => {
                    if up_tx
                        .send(UpstreamMessage::Text(update.into()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                    config_injected = true;
                    info!(%session_id, "session configuration injected");
                }
                Err(e) => {
                    // Constant payload; failing to serialize it is a bug, not
                    // a session condition.
                    error!(%session_id, error = %e, "session configuration did not serialize");
                }
            }
        }

        let Some(outbound) = upstream_frame_to_client(frame) else {
            continue;
        };
        let forwarded_close = matches!(outbound, ClientMessage::Close(_));
        match timeout(FORWARD_SEND_TIMEOUT, client_sink.send(outbound)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(%session_id, error = %e, "client send failed");
                return;
            }
            Err(_) => {
                warn!(%session_id, "client send stalled, tearing down session");
                return;
            }
        }
        if forwarded_close {
            return;
        }
    }

    // Upstream dropped; close the client leg within the teardown window.
    let _ = timeout(
        FORWARD_SEND_TIMEOUT,
        client_sink.send(ClientMessage::Close(Some(CloseFrame {
            code: close_code::AWAY,
            reason: Utf8Bytes::from_static("upstream closed"),
        }))),
    )
    .await;
}

/// The injected `session.update` wire frame.
fn session_update_frame() -> Result<String, serde_json::Error> {
    ClientEvent::SessionUpdate {
        session: session_config(),
    }
    .to_frame()
}

/// Map a client frame onto the upstream connection. Ping/Pong are answered by
/// the transport layer and carry no application semantics.
fn client_frame_to_upstream(frame: ClientMessage) -> Option<UpstreamMessage> {
    match frame {
        ClientMessage::Text(text) => Some(UpstreamMessage::Text(text.as_str().to_owned().into())),
        ClientMessage::Binary(data) => Some(UpstreamMessage::Binary(data)),
        ClientMessage::Close(frame) => Some(UpstreamMessage::Close(frame.map(|f| {
            UpstreamCloseFrame {
                code: f.code.into(),
                reason: f.reason.as_str().to_owned().into(),
            }
        }))),
        ClientMessage::Ping(_) | ClientMessage::Pong(_) => None,
    }
}

/// Map an upstream frame onto the client connection.
fn upstream_frame_to_client(frame: UpstreamMessage) -> Option<ClientMessage> {
    match frame {
        UpstreamMessage::Text(text) => Some(ClientMessage::Text(text.as_str().to_owned().into())),
        UpstreamMessage::Binary(data) => Some(ClientMessage::Binary(data)),
        UpstreamMessage::Close(frame) => Some(ClientMessage::Close(frame.map(|f| CloseFrame {
            code: f.code.into(),
            reason: f.reason.as_str().to_owned().into(),
        }))),
        UpstreamMessage::Ping(_) | UpstreamMessage::Pong(_) => None,
        // Raw frames never surface from a read half.
        UpstreamMessage::Frame(_) => None,
    }
}
