use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};
use crate::error::{Result, SessionError};
use hound::WavReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

/// A WAV file loaded fully into memory.
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path)
            .map_err(|e| SessionError::DeviceNotFound(format!("{}: {}", path.display(), e)))?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| SessionError::Other(format!("failed to read audio samples: {}", e)))?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }
}

/// Capture backend that replays a WAV fixture in real time.
///
/// Frames are emitted at the configured buffer cadence until the file runs
/// out, then the channel closes. Stands in for the microphone in tests and
/// demos where no capture device exists.
pub struct FileBackend {
    path: PathBuf,
    config: AudioBackendConfig,
    capturing: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl FileBackend {
    pub fn new(path: PathBuf, config: AudioBackendConfig) -> Result<Self> {
        Ok(Self {
            path,
            config,
            capturing: Arc::new(AtomicBool::new(false)),
            task: None,
        })
    }
}

#[async_trait::async_trait]
impl AudioBackend for FileBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.capturing.load(Ordering::SeqCst) {
            return Err(SessionError::Other("already capturing".to_string()));
        }

        let file = AudioFile::open(&self.path)?;
        let frame_ms = self.config.buffer_duration_ms;
        let samples_per_frame =
            (file.sample_rate as u64 * file.channels as u64 * frame_ms / 1000) as usize;

        self.capturing.store(true, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(100);
        let capturing = Arc::clone(&self.capturing);

        self.task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(frame_ms));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut offset = 0usize;
            let mut elapsed_ms = 0u64;

            while offset < file.samples.len() {
                interval.tick().await;
                if !capturing.load(Ordering::SeqCst) {
                    break;
                }

                let end = (offset + samples_per_frame.max(1)).min(file.samples.len());
                elapsed_ms += frame_ms;

                let frame = AudioFrame {
                    samples: file.samples[offset..end].to_vec(),
                    sample_rate: file.sample_rate,
                    channels: file.channels,
                    timestamp_ms: elapsed_ms,
                };
                offset = end;

                if tx.send(frame).await.is_err() {
                    break;
                }
            }

            capturing.store(false, Ordering::SeqCst);
        }));

        info!("File capture started: {}", self.path.display());

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if !self.capturing.load(Ordering::SeqCst) && self.task.is_none() {
            return Ok(());
        }

        self.capturing.store(false, Ordering::SeqCst);

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }

        info!("File capture stopped");

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "wav file"
    }
}
