//! Wire messages exchanged with the voice backend
//!
//! The call transport carries two kinds of traffic: opaque binary audio and
//! UTF-8 text frames holding exactly one JSON control message. Only the JSON
//! side is modeled here; binary payloads stay `Vec<u8>` until the playback
//! sequencer decodes them.

use crate::error::SessionError;
use serde::{Deserialize, Serialize};

/// A structured text message from the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// A user-speech segment from the transcriber.
    Transcript { text: String, is_final: bool },

    /// An incremental chunk of generated agent text.
    LlmChunk { text: String },
}

impl ControlMessage {
    /// Parse a raw text frame into a control message.
    ///
    /// Unknown message types and malformed JSON both yield
    /// `SessionError::ControlParse`; the caller logs and drops those without
    /// failing the session.
    pub fn parse(raw: &str) -> Result<Self, SessionError> {
        serde_json::from_str(raw).map_err(|e| SessionError::ControlParse(e.to_string()))
    }
}
