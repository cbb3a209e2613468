//! Shared application state
//!
//! One `AppState` is created at startup and shared by every handler through
//! axum's `State` extractor. Apart from the read-only configuration it only
//! tracks the number of active relay sessions, enforced before the WebSocket
//! upgrade so a server at capacity rejects with an HTTP status instead of
//! accepting a session it will immediately starve.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::ServerConfig;

/// Returned when no session slot is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtCapacity;

/// Shared application state.
#[derive(Debug)]
pub struct AppState {
    pub config: ServerConfig,
    active_sessions: AtomicUsize,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            active_sessions: AtomicUsize::new(0),
        })
    }

    /// Number of currently active relay sessions.
    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::Acquire)
    }

    /// Try to acquire a session slot. Released by dropping the guard.
    pub fn try_acquire_session(state: &Arc<Self>) -> Result<SessionGuard, AtCapacity> {
        let limit = state.config.max_sessions;
        let mut current = state.active_sessions.load(Ordering::Acquire);
        loop {
            if current >= limit {
                return Err(AtCapacity);
            }
            match state.active_sessions.compare_exchange(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(SessionGuard(Arc::clone(state))),
                Err(observed) => current = observed,
            }
        }
    }
}

/// RAII slot for one active session; releases the slot on drop so every
/// teardown path (normal close, error, panic unwind) returns capacity.
#[derive(Debug)]
pub struct SessionGuard(Arc<AppState>);

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.0.active_sessions.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(max_sessions: usize) -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            upstream_url: "ws://127.0.0.1:1/realtime".to_string(),
            upstream_model: "test-model".to_string(),
            upstream_api_key: "sk-test".to_string(),
            max_sessions,
            cors_allowed_origins: None,
        }
    }

    #[test]
    fn test_acquire_and_release() {
        let state = AppState::new(test_config(2));
        assert_eq!(state.active_sessions(), 0);

        let a = AppState::try_acquire_session(&state).unwrap();
        let b = AppState::try_acquire_session(&state).unwrap();
        assert_eq!(state.active_sessions(), 2);

        assert_eq!(AppState::try_acquire_session(&state).unwrap_err(), AtCapacity);

        drop(a);
        assert_eq!(state.active_sessions(), 1);
        let _c = AppState::try_acquire_session(&state).unwrap();

        drop(b);
        assert_eq!(state.active_sessions(), 1);
    }

    #[test]
    fn test_guard_releases_exactly_once() {
        let state = AppState::new(test_config(1));
        for _ in 0..10 {
            let guard = AppState::try_acquire_session(&state).unwrap();
            drop(guard);
        }
        assert_eq!(state.active_sessions(), 0);
    }
}
