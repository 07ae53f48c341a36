//! Ordered transcript log for a live call
//!
//! The log is append-only except for one defined mutation: an incoming
//! segment may merge into the most recent item when that item belongs to the
//! same speaker and is not yet final. This keeps the invariant that at most
//! one mutable (non-final) trailing item exists at any time while everything
//! before it is immutable history.

use serde::{Deserialize, Serialize};

/// Who produced a span of speech.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// The caller (speech-to-text output).
    User,
    /// The voice agent (generated response text).
    Agent,
}

/// One contiguous span of speech attributed to a single speaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptItem {
    /// Transcribed or generated text.
    pub text: String,

    /// Whether this span is complete. Non-final items may still grow.
    pub is_final: bool,

    /// Who spoke.
    pub speaker: Speaker,
}

/// The ordered transcript of one call session.
///
/// Owned by the session controller; the rendering layer only ever sees
/// `items()`.
#[derive(Debug, Default, Clone)]
pub struct TranscriptLog {
    items: Vec<TranscriptItem>,
}

impl TranscriptLog {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Append a new item unconditionally.
    ///
    /// Used for `transcript` messages: every user segment starts a new item,
    /// regardless of what precedes it.
    pub fn append(&mut self, speaker: Speaker, text: &str, is_final: bool) {
        self.items.push(TranscriptItem {
            text: text.to_string(),
            is_final,
            speaker,
        });
    }

    /// Append a segment, merging into the trailing item when allowed.
    ///
    /// Merge happens only when the trailing item has the same speaker and is
    /// not final; the new text is concatenated and the finality flag updated.
    /// Otherwise a new item is appended. Used for `llm_chunk` messages so a
    /// streamed agent turn accumulates into a single entry.
    pub fn append_or_merge(&mut self, speaker: Speaker, text: &str, is_final: bool) {
        match self.items.last_mut() {
            Some(last) if last.speaker == speaker && !last.is_final => {
                last.text.push_str(text);
                last.is_final = is_final;
            }
            _ => self.append(speaker, text, is_final),
        }
    }

    /// Read-only view of the log.
    pub fn items(&self) -> &[TranscriptItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drop all items. Called when a new session starts.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}
