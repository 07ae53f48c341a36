pub mod backend;
pub mod chunk;
pub mod file;
pub mod mic;
pub mod playback;

pub use backend::{AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource};
pub use chunk::{CallRecorder, ChunkMetadata, RecorderConfig};
pub use file::{AudioFile, FileBackend};
pub use playback::{decode_payload, DecodedAudio, PlaybackSink};
