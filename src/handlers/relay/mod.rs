//! Relay WebSocket handler
//!
//! Terminates one client-facing duplex connection per session and bridges it
//! to one upstream realtime connection. Frames pass through unmodified in
//! both directions; the single exception is the session configuration frame
//! the relay injects upstream after the upstream reports `session.created`.

mod handler;

pub use handler::relay_handler;
