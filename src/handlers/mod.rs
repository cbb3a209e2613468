pub mod relay;

pub use relay::relay_handler;

use axum::Json;
use serde_json::{Value, json};

/// Public health check.
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
