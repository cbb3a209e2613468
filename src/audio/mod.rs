//! Audio plumbing for the client side: the PCM16 wire codec, the playback
//! sequencer, and microphone capture.

pub mod capture;
pub mod codec;
pub mod playback;

use thiserror::Error;

pub use capture::CpalCapture;
pub use playback::{AudioSink, CpalPlayer, SampleQueue};

/// Audio sample rate used on the wire and at both devices' edges.
pub use crate::core::realtime::UPSTREAM_SAMPLE_RATE as SAMPLE_RATE;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio device error: {0}")]
    Device(String),

    #[error("audio stream error: {0}")]
    Stream(String),

    #[error("invalid audio payload: {0}")]
    Decode(String),
}
