//! Relay WebSocket route configuration
//!
//! # Endpoint
//!
//! `GET /realtime` - WebSocket upgrade for one relay session
//!
//! # Protocol
//!
//! After the upgrade, frames are JSON events in the upstream realtime wire
//! format and pass through the relay verbatim in both directions. The relay
//! injects the fixed session configuration upstream once the upstream reports
//! `session.created`; clients cannot configure the session.

use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::relay_handler;
use crate::state::AppState;

/// Create the relay WebSocket router
pub fn create_relay_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/realtime", get(relay_handler))
        .layer(TraceLayer::new_for_http())
}
