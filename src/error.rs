//! Error taxonomy for the call session
//!
//! Every failure that can terminate or degrade a live call maps to one of
//! these variants. The `Display` strings are the user-facing status messages
//! shown by the live monitor, so they are written for humans, not logs.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Microphone access was refused by the OS / audio server.
    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),

    /// No usable capture device is present.
    #[error("No microphone found: {0}")]
    DeviceNotFound(String),

    /// The call transport could not be opened.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The transport closed with a non-normal code or unclean shutdown.
    #[error("Connection closed unexpectedly (code {code}): {reason}")]
    AbnormalClosure { code: u16, reason: String },

    /// An inbound binary payload could not be decoded to playable audio.
    /// Logged and dropped; never terminates the session.
    #[error("Audio decode failed: {0}")]
    AudioDecode(String),

    /// An inbound text message was not valid JSON / not a known message type.
    /// Logged and dropped; never terminates the session.
    #[error("Unparseable control message: {0}")]
    ControlParse(String),

    /// Anything that does not fit the classes above.
    #[error("Error: {0}")]
    Other(String),
}

impl SessionError {
    /// Classify a capture-layer failure message.
    ///
    /// cpal reports permission problems as backend-specific errors with no
    /// dedicated variant, so the classification keys off the message text.
    pub fn from_capture_failure(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("denied") || lower.contains("permission") || lower.contains("not allowed")
        {
            SessionError::PermissionDenied(message)
        } else {
            SessionError::Other(message)
        }
    }

    /// Whether this error terminates the session.
    ///
    /// Decode and parse failures are logged and the offending message is
    /// dropped; everything else tears the session down.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            SessionError::AudioDecode(_) | SessionError::ControlParse(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
