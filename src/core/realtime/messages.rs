//! Realtime wire protocol event types.
//!
//! All events are JSON objects carrying a `type` discriminant. Client events
//! flow client → relay → upstream; server events flow back the other way.
//! Event types neither side recognizes are never fatal: the relay forwards
//! frames verbatim without validating them, and consumers that do parse map
//! unrecognized discriminants to [`ServerEvent::Unknown`].

use serde::{Deserialize, Serialize};

// =============================================================================
// Session Configuration
// =============================================================================

/// Session configuration payload of the injected `session.update` frame.
///
/// Every field is concrete: the relay sends one complete, fixed configuration
/// per session (see `config::session_config`), never a partial update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Response modalities (text, audio)
    pub modalities: Vec<String>,
    /// System instructions for the assistant
    pub instructions: String,
    /// Voice for audio output
    pub voice: String,
    /// Input audio format
    pub input_audio_format: String,
    /// Output audio format
    pub output_audio_format: String,
    /// Input audio transcription configuration
    pub input_audio_transcription: InputAudioTranscription,
    /// Turn detection configuration
    pub turn_detection: TurnDetection,
    /// Temperature for response generation
    pub temperature: f32,
    /// Maximum response output tokens
    pub max_response_output_tokens: u32,
}

/// Input audio transcription configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputAudioTranscription {
    /// Transcription model (e.g., "whisper-1")
    pub model: String,
}

/// Turn detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TurnDetection {
    /// Server-side VAD with a fixed energy threshold
    #[serde(rename = "server_vad")]
    ServerVad {
        /// Activation threshold
        threshold: f32,
        /// Audio prefix padding in ms
        prefix_padding_ms: u32,
        /// Silence duration that ends a turn, in ms
        silence_duration_ms: u32,
    },
}

// =============================================================================
// Conversation Items
// =============================================================================

/// Conversation item carried by `conversation.item.create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationItem {
    /// Item type (always "message" here)
    #[serde(rename = "type")]
    pub item_type: String,
    /// Item role (user, assistant)
    pub role: String,
    /// Content parts
    pub content: Vec<ContentPart>,
}

/// Content part within a conversation item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentPart {
    /// Content type (input_text, text)
    #[serde(rename = "type")]
    pub content_type: String,
    /// Text content
    pub text: String,
}

// =============================================================================
// Client Events (sent toward the upstream)
// =============================================================================

/// Client events sent toward the upstream realtime service.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Update session configuration
    #[serde(rename = "session.update")]
    SessionUpdate {
        /// Session configuration
        session: SessionConfig,
    },

    /// Append audio to the input buffer
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend {
        /// Base64-encoded PCM16 audio
        audio: String,
    },

    /// Create a conversation item
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate {
        /// Item to create
        item: ConversationItem,
    },

    /// Request a response
    #[serde(rename = "response.create")]
    ResponseCreate,
}

impl ClientEvent {
    /// Create an audio append event from an already-encoded chunk.
    pub fn audio_append(encoded: String) -> Self {
        ClientEvent::InputAudioBufferAppend { audio: encoded }
    }

    /// Create a user text message item.
    pub fn user_text_message(text: &str) -> Self {
        ClientEvent::ConversationItemCreate {
            item: ConversationItem {
                item_type: "message".to_string(),
                role: "user".to_string(),
                content: vec![ContentPart {
                    content_type: "input_text".to_string(),
                    text: text.to_string(),
                }],
            },
        }
    }

    /// Serialize to the JSON wire frame.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Server Events (received from the upstream)
// =============================================================================

/// Server events received from the upstream realtime service.
///
/// Only the variants this system acts on are modeled; every other event type
/// deserializes to [`ServerEvent::Unknown`] and is ignored by consumers.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Error occurred
    #[serde(rename = "error")]
    Error {
        /// Error details
        error: ApiError,
    },

    /// Session established by the upstream
    #[serde(rename = "session.created")]
    SessionCreated,

    /// Speech detection started (upstream VAD)
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted,

    /// Speech detection stopped (upstream VAD)
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped,

    /// User speech transcription completed
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    TranscriptionCompleted {
        /// Transcript text
        transcript: String,
    },

    /// Response generation started
    #[serde(rename = "response.created")]
    ResponseCreated {
        /// Response information
        response: ResponseInfo,
    },

    /// Response generation finished
    #[serde(rename = "response.done")]
    ResponseDone {
        /// Response information
        response: ResponseInfo,
    },

    /// Assistant transcript chunk
    #[serde(rename = "response.audio_transcript.delta")]
    AudioTranscriptDelta {
        /// Transcript delta
        delta: String,
    },

    /// Assistant transcript finished
    #[serde(rename = "response.audio_transcript.done")]
    AudioTranscriptDone {
        /// Full transcript as assembled by the upstream
        transcript: String,
    },

    /// Assistant audio chunk
    #[serde(rename = "response.audio.delta")]
    AudioDelta {
        /// Base64-encoded PCM16 audio delta
        delta: String,
    },

    /// Any event type this client does not act on
    #[serde(other)]
    Unknown,
}

/// API error information.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    /// Error type
    #[serde(rename = "type")]
    pub error_type: String,
    /// Error message
    pub message: String,
}

/// Response envelope carried by `response.created` / `response.done`.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseInfo {
    /// Response ID
    pub id: String,
}

/// Read the `type` discriminant of a raw frame without validating the rest.
///
/// The relay uses this to spot `session.created` while forwarding frames it
/// otherwise never inspects.
pub fn peek_event_type(raw: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct Probe {
        #[serde(rename = "type")]
        event_type: String,
    }
    serde_json::from_str::<Probe>(raw)
        .ok()
        .map(|p| p.event_type)
}
