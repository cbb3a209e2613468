//! Fixed session configuration for the upstream realtime service.
//!
//! These values are part of the observable contract of the relay: turn-taking
//! feel (silence duration, padding, threshold) and response shape are fixed
//! per deployment and not client-configurable, so they live here as named
//! constants rather than tunables.

use super::messages::{InputAudioTranscription, SessionConfig, TurnDetection};

/// Upstream realtime WebSocket endpoint.
pub const UPSTREAM_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";

/// Default upstream model.
pub const UPSTREAM_REALTIME_MODEL: &str = "gpt-4o-realtime-preview";

/// Audio sample rate in both directions (16-bit linear PCM, mono).
pub const UPSTREAM_SAMPLE_RATE: u32 = 24_000;

/// Wire name of the one supported audio format.
pub const UPSTREAM_AUDIO_FORMAT: &str = "pcm16";

/// Voice identity for assistant audio.
pub const SESSION_VOICE: &str = "alloy";

/// System instruction injected into every session.
pub const SESSION_INSTRUCTIONS: &str = "You are a friendly, patient conversation \
partner helping the user practice speaking. Reply briefly and naturally, in the \
language the user speaks to you, and gently rephrase what the user said when it \
contains mistakes.";

/// Transcription model for user speech.
pub const TRANSCRIPTION_MODEL: &str = "whisper-1";

/// Server-VAD activation threshold.
pub const VAD_THRESHOLD: f32 = 0.5;

/// Audio retained before detected speech onset.
pub const VAD_PREFIX_PADDING_MS: u32 = 300;

/// Trailing silence that ends the user's turn.
pub const VAD_SILENCE_DURATION_MS: u32 = 500;

/// Sampling temperature for responses.
pub const SESSION_TEMPERATURE: f32 = 0.8;

/// Upper bound on response length.
pub const SESSION_MAX_RESPONSE_TOKENS: u32 = 4096;

/// Build the session configuration frame payload the relay injects once per
/// session, after the upstream reports `session.created`.
pub fn session_config() -> SessionConfig {
    SessionConfig {
        modalities: vec!["text".to_string(), "audio".to_string()],
        instructions: SESSION_INSTRUCTIONS.to_string(),
        voice: SESSION_VOICE.to_string(),
        input_audio_format: UPSTREAM_AUDIO_FORMAT.to_string(),
        output_audio_format: UPSTREAM_AUDIO_FORMAT.to_string(),
        input_audio_transcription: InputAudioTranscription {
            model: TRANSCRIPTION_MODEL.to_string(),
        },
        turn_detection: TurnDetection::ServerVad {
            threshold: VAD_THRESHOLD,
            prefix_padding_ms: VAD_PREFIX_PADDING_MS,
            silence_duration_ms: VAD_SILENCE_DURATION_MS,
        },
        temperature: SESSION_TEMPERATURE,
        max_response_output_tokens: SESSION_MAX_RESPONSE_TOKENS,
    }
}
