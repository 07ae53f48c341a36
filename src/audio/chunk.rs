use super::backend::AudioFrame;
use crate::error::{Result, SessionError};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use tracing::{info, warn};

/// Call recording configuration
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Duration of each chunk in seconds before rotating files
    pub chunk_duration_secs: u64,
    /// Output directory for chunks
    pub output_dir: PathBuf,
    /// Call ID (used for chunk filenames)
    pub call_id: String,
}

impl RecorderConfig {
    pub fn new(call_id: String, output_dir: PathBuf) -> Self {
        Self {
            chunk_duration_secs: 300, // 5 minute chunks
            output_dir,
            call_id,
        }
    }
}

/// Metadata for a single recorded chunk
#[derive(Debug, Clone)]
pub struct ChunkMetadata {
    /// Chunk number (0-indexed)
    pub chunk_index: usize,
    /// File path to the chunk
    pub file_path: PathBuf,
    /// Start time in milliseconds since the call started
    pub start_ms: u64,
    /// End time in milliseconds since the call started
    pub end_ms: u64,
    /// Sample rate
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Number of samples in this chunk
    pub sample_count: usize,
}

/// Writes the microphone side of a call to disk as rotating WAV chunks.
///
/// Push-driven: the session's encoder task hands each captured frame over as
/// it is emitted. Only audio is persisted; transcript text never is.
pub struct CallRecorder {
    config: RecorderConfig,
    current_chunk: Option<ChunkWriter>,
    chunk_index: usize,
    completed: Vec<ChunkMetadata>,
}

impl CallRecorder {
    pub fn new(config: RecorderConfig) -> Result<Self> {
        fs::create_dir_all(&config.output_dir).map_err(|e| {
            SessionError::Other(format!(
                "failed to create recording directory {}: {}",
                config.output_dir.display(),
                e
            ))
        })?;

        info!(
            "Call recorder initialized: {} (chunks: {}s each)",
            config.call_id, config.chunk_duration_secs
        );

        Ok(Self {
            config,
            current_chunk: None,
            chunk_index: 0,
            completed: Vec::new(),
        })
    }

    /// Append one captured frame, rotating to a new chunk file when the
    /// configured duration is exceeded.
    pub fn write_frame(&mut self, frame: &AudioFrame) -> Result<()> {
        if self.should_start_new_chunk(frame) {
            if let Some(chunk) = self.current_chunk.take() {
                let meta = chunk.finish()?;
                info!(
                    "Chunk {} complete: {:.1}s - {:.1}s ({} samples)",
                    meta.chunk_index,
                    meta.start_ms as f64 / 1000.0,
                    meta.end_ms as f64 / 1000.0,
                    meta.sample_count
                );
                self.completed.push(meta);
            }
            self.current_chunk = Some(self.start_new_chunk(frame)?);
        }

        if let Some(chunk) = &mut self.current_chunk {
            chunk.write_frame(frame)?;
        }

        Ok(())
    }

    /// Finalize the open chunk and return metadata for every chunk written.
    pub fn finish(mut self) -> Result<Vec<ChunkMetadata>> {
        if let Some(chunk) = self.current_chunk.take() {
            let meta = chunk.finish()?;
            info!(
                "Final chunk {} complete: {:.1}s - {:.1}s ({} samples)",
                meta.chunk_index,
                meta.start_ms as f64 / 1000.0,
                meta.end_ms as f64 / 1000.0,
                meta.sample_count
            );
            self.completed.push(meta);
        }

        info!("Call recording complete: {} chunks saved", self.completed.len());

        Ok(self.completed)
    }

    fn should_start_new_chunk(&self, frame: &AudioFrame) -> bool {
        match &self.current_chunk {
            None => true,
            Some(chunk) => {
                let chunk_duration_ms = self.config.chunk_duration_secs * 1000;
                let elapsed_ms = frame.timestamp_ms.saturating_sub(chunk.metadata.start_ms);
                elapsed_ms >= chunk_duration_ms
            }
        }
    }

    fn start_new_chunk(&mut self, frame: &AudioFrame) -> Result<ChunkWriter> {
        let chunk_path = self.config.output_dir.join(format!(
            "{}-chunk-{:03}.wav",
            self.config.call_id, self.chunk_index
        ));

        let chunk = ChunkWriter::new(
            chunk_path,
            self.chunk_index,
            frame.timestamp_ms,
            frame.sample_rate,
            frame.channels,
        )?;

        self.chunk_index += 1;

        Ok(chunk)
    }
}

/// Writes a single chunk to disk as a WAV file
struct ChunkWriter {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    metadata: ChunkMetadata,
}

impl ChunkWriter {
    fn new(
        file_path: PathBuf,
        chunk_index: usize,
        start_ms: u64,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Self> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(&file_path, spec).map_err(|e| {
            SessionError::Other(format!(
                "failed to create WAV file {}: {}",
                file_path.display(),
                e
            ))
        })?;

        Ok(Self {
            writer: Some(writer),
            metadata: ChunkMetadata {
                chunk_index,
                file_path,
                start_ms,
                end_ms: start_ms,
                sample_rate,
                channels,
                sample_count: 0,
            },
        })
    }

    fn write_frame(&mut self, frame: &AudioFrame) -> Result<()> {
        if let Some(writer) = &mut self.writer {
            for &sample in &frame.samples {
                writer
                    .write_sample(sample)
                    .map_err(|e| SessionError::Other(format!("failed to write sample: {}", e)))?;
            }

            self.metadata.end_ms = frame.timestamp_ms;
            self.metadata.sample_count += frame.samples.len();
        }

        Ok(())
    }

    fn finish(mut self) -> Result<ChunkMetadata> {
        if let Some(writer) = self.writer.take() {
            writer
                .finalize()
                .map_err(|e| SessionError::Other(format!("failed to finalize WAV: {}", e)))?;
        }

        Ok(self.metadata.clone())
    }
}

impl Drop for ChunkWriter {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV writer on drop: {}", e);
            }
        }
    }
}
