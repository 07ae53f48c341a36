use crate::audio::AudioSource;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a call session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Unique call identifier (e.g., "call-2026-08-30-reception")
    pub call_id: String,

    /// Backend host:port the transport connects to
    pub backend_addr: String,

    /// Use wss:// instead of ws:// (mirrors the page-scheme rule of the
    /// hosted dashboard)
    pub secure: bool,

    /// Cadence of outbound audio frames
    /// Default: 250 ms
    pub frame_interval: Duration,

    /// Sample rate for captured audio (the backend transcriber expects 16kHz)
    pub sample_rate: u32,

    /// Number of audio channels (1 = mono, 2 = stereo)
    pub channels: u16,

    /// Where captured audio comes from (microphone, or a WAV fixture)
    pub source: AudioSource,

    /// Route decoded responses to the default output device. When false the
    /// playback sink runs headless and decoded audio is only queued.
    pub playback_device: bool,

    /// When set, the microphone side of the call is also written here as
    /// rotating WAV chunks.
    pub record_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            call_id: format!("call-{}", uuid::Uuid::new_v4()),
            backend_addr: "localhost:8000".to_string(),
            secure: false,
            frame_interval: Duration::from_millis(250),
            sample_rate: 16000,
            channels: 1,
            source: AudioSource::Microphone,
            playback_device: true,
            record_dir: None,
        }
    }
}

impl SessionConfig {
    /// Full transport URL for this session.
    pub fn transport_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}/ws/conversation", scheme, self.backend_addr)
    }
}
