//! Upstream WebSocket connection establishment.
//!
//! The relay is the only party that talks to the upstream service, using a
//! server-held credential. The credential travels in the handshake request
//! headers and is never forwarded to or accepted from clients.

use http::Request;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::handshake::client::generate_key;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

/// The upstream leg of one relay session.
pub type UpstreamStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("invalid upstream endpoint '{endpoint}': {reason}")]
    Endpoint { endpoint: String, reason: String },

    #[error("failed to build upstream request: {0}")]
    Request(String),

    #[error("upstream connection failed: {0}")]
    Connection(String),
}

/// Open the upstream duplex connection for one session.
///
/// `endpoint` already carries the model query parameter
/// (see `ServerConfig::upstream_endpoint`).
pub async fn connect(endpoint: &str, api_key: &str) -> Result<UpstreamStream, UpstreamError> {
    let request = build_request(endpoint, api_key)?;

    let (stream, _response) = connect_async(request)
        .await
        .map_err(|e| UpstreamError::Connection(e.to_string()))?;

    tracing::debug!(endpoint, "connected to upstream realtime service");
    Ok(stream)
}

fn build_request(endpoint: &str, api_key: &str) -> Result<Request<()>, UpstreamError> {
    let parsed = url::Url::parse(endpoint).map_err(|e| UpstreamError::Endpoint {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })?;
    let host = parsed.host_str().ok_or_else(|| UpstreamError::Endpoint {
        endpoint: endpoint.to_string(),
        reason: "missing host".to_string(),
    })?;
    let host_header = match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    Request::builder()
        .uri(endpoint)
        .header("Authorization", format!("Bearer {api_key}"))
        .header("OpenAI-Beta", "realtime=v1")
        .header("Sec-WebSocket-Key", generate_key())
        .header("Sec-WebSocket-Version", "13")
        .header("Connection", "Upgrade")
        .header("Upgrade", "websocket")
        .header("Host", host_header)
        .body(())
        .map_err(|e| UpstreamError::Request(e.to_string()))
}
