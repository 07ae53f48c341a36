pub mod audio;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod protocol;
pub mod session;
pub mod transcript;
pub mod transport;

pub use audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFile, AudioFrame, AudioSource,
    CallRecorder, PlaybackSink, RecorderConfig,
};
pub use config::Config;
pub use dashboard::{CallLog, DashboardClient};
pub use error::SessionError;
pub use protocol::ControlMessage;
pub use session::{CallSession, CallStatus, SessionConfig, SessionStats};
pub use transcript::{Speaker, TranscriptItem, TranscriptLog};
pub use transport::TransportEvent;
