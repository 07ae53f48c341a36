use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of a call session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CallStatus {
    /// No session in progress
    Idle,
    /// Session live; streaming microphone audio
    Listening,
    /// The agent has started responding (capture continues)
    Speaking,
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallStatus::Idle => write!(f, "IDLE"),
            CallStatus::Listening => write!(f, "LISTENING"),
            CallStatus::Speaking => write!(f, "SPEAKING"),
        }
    }
}

/// Lock-free status holder shared between the controller and its tasks.
pub(crate) struct StatusCell(AtomicU8);

impl StatusCell {
    pub fn new(status: CallStatus) -> Self {
        Self(AtomicU8::new(status as u8))
    }

    pub fn set(&self, status: CallStatus) {
        self.0.store(status as u8, Ordering::SeqCst);
    }

    pub fn get(&self) -> CallStatus {
        match self.0.load(Ordering::SeqCst) {
            1 => CallStatus::Listening,
            2 => CallStatus::Speaking,
            _ => CallStatus::Idle,
        }
    }
}

/// Statistics about a call session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Current lifecycle state
    pub status: CallStatus,

    /// When the session started
    pub started_at: DateTime<Utc>,

    /// Total duration in seconds
    pub duration_secs: f64,

    /// Number of outbound audio frames sent
    pub frames_sent: usize,

    /// Number of inbound audio payloads decoded and queued
    pub payloads_played: usize,

    /// Number of transcript items accumulated
    pub transcript_items: usize,
}
