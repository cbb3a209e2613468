//! Upstream realtime speech protocol
//!
//! Wire types and connection plumbing for the duplex speech service the relay
//! bridges to. The protocol is JSON-framed over WebSocket: clients append
//! base64 PCM16 audio and create conversation items; the service streams back
//! audio deltas, transcript deltas, and turn-detection events.

pub mod config;
pub mod messages;
pub mod upstream;

pub use config::{
    SESSION_INSTRUCTIONS, SESSION_MAX_RESPONSE_TOKENS, SESSION_TEMPERATURE, SESSION_VOICE,
    UPSTREAM_AUDIO_FORMAT, UPSTREAM_REALTIME_MODEL, UPSTREAM_REALTIME_URL, UPSTREAM_SAMPLE_RATE,
    VAD_PREFIX_PADDING_MS, VAD_SILENCE_DURATION_MS, VAD_THRESHOLD, session_config,
};
pub use messages::{
    ApiError, ClientEvent, ContentPart, ConversationItem, InputAudioTranscription, ResponseInfo,
    ServerEvent, SessionConfig, TurnDetection, peek_event_type,
};
pub use upstream::{UpstreamError, UpstreamStream, connect as connect_upstream};
