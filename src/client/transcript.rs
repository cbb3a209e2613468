//! Transcript model.
//!
//! Assistant utterances stream in as transcript chunks and only become a
//! [`Message`] when the finish event arrives; the in-flight text lives in an
//! explicit [`TranscriptAccumulator`] state so a chunk run can never leak
//! across turns. User messages materialize atomically (from a completed
//! transcription or an optimistic text send). The transcript itself is
//! append-only; entries are never mutated once pushed.

use std::mem;
use std::time::SystemTime;

use serde::Serialize;

/// Who said it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

/// One completed transcript entry.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: SystemTime,
}

/// Per-utterance accumulation state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TranscriptAccumulator {
    #[default]
    Idle,
    Accumulating(String),
}

impl TranscriptAccumulator {
    /// Fold one streamed chunk into the in-flight utterance.
    pub fn push_chunk(&mut self, delta: &str) {
        match self {
            TranscriptAccumulator::Idle => {
                *self = TranscriptAccumulator::Accumulating(delta.to_string());
            }
            TranscriptAccumulator::Accumulating(text) => text.push_str(delta),
        }
    }

    /// Complete the in-flight utterance, returning its text and resetting to
    /// idle. `None` when no chunk was ever seen.
    pub fn finish(&mut self) -> Option<String> {
        match mem::take(self) {
            TranscriptAccumulator::Idle => None,
            TranscriptAccumulator::Accumulating(text) => Some(text),
        }
    }

    /// Drop any in-flight utterance.
    pub fn reset(&mut self) {
        *self = TranscriptAccumulator::Idle;
    }

    pub fn is_accumulating(&self) -> bool {
        matches!(self, TranscriptAccumulator::Accumulating(_))
    }
}

/// Append-only, ordered list of completed messages.
#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<Message>,
}

impl Transcript {
    pub fn push_user(&mut self, text: impl Into<String>) -> Message {
        self.push(Speaker::User, text.into())
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) -> Message {
        self.push(Speaker::Assistant, text.into())
    }

    fn push(&mut self, speaker: Speaker, text: String) -> Message {
        let message = Message {
            speaker,
            text,
            timestamp: SystemTime::now(),
        };
        self.entries.push(message.clone());
        message
    }

    pub fn entries(&self) -> &[Message] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
