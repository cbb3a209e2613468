//! Client session toolkit
//!
//! Everything a front end needs to hold one live voice conversation through
//! the relay: the session controller owning the connection, the transcript
//! model, and derived turn/connection state.

pub mod controller;
pub mod transcript;

pub use controller::{ConnectionState, SessionController, SessionError, TurnState};
pub use transcript::{Message, Speaker, Transcript, TranscriptAccumulator};
