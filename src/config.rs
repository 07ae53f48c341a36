use anyhow::Result;
use serde::Deserialize;

/// Environment variable carrying the backend host:port.
pub const BACKEND_ADDR_ENV: &str = "CLINIC_BACKEND_ADDR";

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
}

#[derive(Debug, Deserialize)]
pub struct BackendConfig {
    /// host:port of the voice backend
    #[serde(default = "default_backend_addr")]
    pub addr: String,

    /// Use wss:// and https:// instead of the plain variants
    #[serde(default)]
    pub secure: bool,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
    /// Outbound frame cadence in milliseconds
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct RecordingConfig {
    /// Save the microphone side of each call as WAV chunks
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_recordings_path")]
    pub path: String,
}

fn default_backend_addr() -> String {
    "localhost:8000".to_string()
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_channels() -> u16 {
    1
}

fn default_frame_interval_ms() -> u64 {
    250
}

fn default_recordings_path() -> String {
    "recordings".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            addr: default_backend_addr(),
            secure: false,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            frame_interval_ms: default_frame_interval_ms(),
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_recordings_path(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            audio: AudioConfig::default(),
            recording: RecordingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from an optional file, then apply the backend
    /// address from the environment when present. Everything has a default,
    /// so a missing file is fine.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .build()?;

        let mut cfg: Config = settings.try_deserialize()?;

        if let Ok(addr) = std::env::var(BACKEND_ADDR_ENV) {
            if !addr.is_empty() {
                cfg.backend.addr = addr;
            }
        }

        Ok(cfg)
    }

    /// Base URL for the dashboard REST API.
    pub fn api_base_url(&self) -> String {
        let scheme = if self.backend.secure { "https" } else { "http" };
        format!("{}://{}", scheme, self.backend.addr)
    }
}
