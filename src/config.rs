//! Configuration module for the Parla Gateway server
//!
//! Configuration is read from environment variables (a `.env` file is loaded
//! by the binary before this runs). The upstream credential is deliberately
//! startup-fatal: a relay without it would accept sessions it can never
//! serve, so `from_env` refuses to produce a config at all.

use std::env;

use thiserror::Error;

use crate::core::realtime::{UPSTREAM_REALTIME_MODEL, UPSTREAM_REALTIME_URL};

/// Default bind host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default bind port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default cap on concurrently active relay sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 64;

/// Configuration errors surfaced at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error("invalid upstream URL '{url}': {reason}")]
    InvalidUpstreamUrl { url: String, reason: String },
}

/// Server configuration
///
/// Everything the relay binary needs to run: bind address, the upstream
/// realtime endpoint and credential, session capacity, and CORS origins.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    /// Upstream realtime WebSocket endpoint (per-deployment, never
    /// client-supplied).
    pub upstream_url: String,
    /// Model query parameter appended to the upstream URL.
    pub upstream_model: String,
    /// Upstream API credential. Held server-side only; never forwarded to or
    /// accepted from clients.
    pub upstream_api_key: String,

    /// Maximum number of concurrently active relay sessions.
    pub max_sessions: usize,

    /// CORS allowed origins (comma-separated list or "*" for all).
    /// Default: None (same-origin only).
    pub cors_allowed_origins: Option<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// `OPENAI_API_KEY` is required; everything else has a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let upstream_api_key = env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingVar("OPENAI_API_KEY"))?;

        let host = env::var("PARLA_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());

        let port = match env::var("PARLA_PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidValue {
                    name: "PARLA_PORT",
                    value: raw,
                })?,
            Err(_) => DEFAULT_PORT,
        };

        let upstream_url =
            env::var("PARLA_UPSTREAM_URL").unwrap_or_else(|_| UPSTREAM_REALTIME_URL.to_string());
        validate_ws_url(&upstream_url)?;

        let upstream_model = env::var("PARLA_UPSTREAM_MODEL")
            .unwrap_or_else(|_| UPSTREAM_REALTIME_MODEL.to_string());

        let max_sessions = match env::var("PARLA_MAX_SESSIONS") {
            Ok(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::InvalidValue {
                    name: "PARLA_MAX_SESSIONS",
                    value: raw,
                })?,
            Err(_) => DEFAULT_MAX_SESSIONS,
        };

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .ok()
            .filter(|v| !v.trim().is_empty());

        Ok(Self {
            host,
            port,
            upstream_url,
            upstream_model,
            upstream_api_key,
            max_sessions,
            cors_allowed_origins,
        })
    }

    /// The socket address string the server binds to.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Full upstream URL including the model query parameter.
    pub fn upstream_endpoint(&self) -> String {
        format!("{}?model={}", self.upstream_url, self.upstream_model)
    }
}

fn validate_ws_url(raw: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(raw).map_err(|e| ConfigError::InvalidUpstreamUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(ConfigError::InvalidUpstreamUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{other}', expected ws or wss"),
        }),
    }
}
