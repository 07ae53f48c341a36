//! Microphone capture backend using cpal
//!
//! Captures 16-bit PCM at the configured rate (16kHz mono by default). Tries
//! the preferred format first (i16/target-rate/mono), then f32 with sample
//! conversion, and finally the device's native config with software channel
//! mixing and resampling.

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};
use crate::error::{Result, SessionError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is only touched through the surrounding Mutex and never
/// crosses thread boundaries while borrowed.
struct SendableStream(#[allow(dead_code)] cpal::Stream);

unsafe impl Send for SendableStream {}

pub struct MicBackend {
    config: AudioBackendConfig,
    device: cpal::Device,
    stream: Arc<Mutex<Option<SendableStream>>>,
    /// Samples accumulated by the cpal callback between frame emissions.
    buffer: Arc<Mutex<Vec<i16>>>,
    capturing: Arc<AtomicBool>,
    pump_task: Option<JoinHandle<()>>,
}

impl MicBackend {
    /// Acquire the default input device.
    ///
    /// This is the user-visible "microphone permission" step: failures here
    /// are classified so the session can surface them as permission-denied or
    /// device-not-found rather than a generic error.
    pub fn new(config: AudioBackendConfig) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| SessionError::DeviceNotFound("no default input device".to_string()))?;

        info!(
            "Microphone backend initialized ({}Hz, {} channels)",
            config.target_sample_rate, config.target_channels
        );

        Ok(Self {
            config,
            device,
            stream: Arc::new(Mutex::new(None)),
            buffer: Arc::new(Mutex::new(Vec::new())),
            capturing: Arc::new(AtomicBool::new(false)),
            pump_task: None,
        })
    }

    /// Build the input stream, preferring formats that need no conversion.
    fn build_stream(&self) -> Result<cpal::Stream> {
        let preferred_config = cpal::StreamConfig {
            channels: self.config.target_channels,
            sample_rate: self.config.target_sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        let err_callback = |err| {
            warn!("Audio input stream error: {}", err);
        };

        // i16 at the target config: zero-copy path.
        let buffer = Arc::clone(&self.buffer);
        if let Ok(stream) = self.device.build_input_stream(
            &preferred_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buf) = buffer.lock() {
                    buf.extend_from_slice(data);
                }
            },
            err_callback,
            None,
        ) {
            return Ok(stream);
        }

        // f32 at the target config: convert samples only.
        let buffer = Arc::clone(&self.buffer);
        if let Ok(stream) = self.device.build_input_stream(
            &preferred_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buf) = buffer.lock() {
                    buf.extend(data.iter().map(|&s| f32_to_i16(s)));
                }
            },
            err_callback,
            None,
        ) {
            return Ok(stream);
        }

        // Fall back to the device's native config with software conversion.
        self.build_stream_native()
    }

    fn build_stream_native(&self) -> Result<cpal::Stream> {
        use cpal::SampleFormat;

        let default_config = self.device.default_input_config().map_err(|e| {
            SessionError::from_capture_failure(format!(
                "failed to query default input config: {}",
                e
            ))
        })?;

        let native_rate = default_config.sample_rate();
        let native_channels = default_config.channels() as usize;
        let target_rate = self.config.target_sample_rate;
        let stream_config: cpal::StreamConfig = default_config.clone().into();

        info!(
            "Using native input format ({}ch/{}Hz/{:?}), converting in software",
            native_channels,
            native_rate,
            default_config.sample_format()
        );

        let err_callback = |err| {
            warn!("Audio input stream error: {}", err);
        };

        let buffer = Arc::clone(&self.buffer);

        match default_config.sample_format() {
            SampleFormat::I16 => self
                .device
                .build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        let converted =
                            mix_to_mono_and_resample(data, native_channels, native_rate, target_rate);
                        if let Ok(mut buf) = buffer.lock() {
                            buf.extend_from_slice(&converted);
                        }
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| {
                    SessionError::from_capture_failure(format!(
                        "failed to build native i16 stream: {}",
                        e
                    ))
                }),
            SampleFormat::F32 => self
                .device
                .build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let i16_data: Vec<i16> = data.iter().map(|&s| f32_to_i16(s)).collect();
                        let converted = mix_to_mono_and_resample(
                            &i16_data,
                            native_channels,
                            native_rate,
                            target_rate,
                        );
                        if let Ok(mut buf) = buffer.lock() {
                            buf.extend_from_slice(&converted);
                        }
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| {
                    SessionError::from_capture_failure(format!(
                        "failed to build native f32 stream: {}",
                        e
                    ))
                }),
            fmt => Err(SessionError::from_capture_failure(format!(
                "unsupported native sample format: {:?}",
                fmt
            ))),
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for MicBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.capturing.load(Ordering::SeqCst) {
            return Err(SessionError::Other("already capturing".to_string()));
        }

        let stream = self.build_stream()?;
        stream
            .play()
            .map_err(|e| SessionError::from_capture_failure(e.to_string()))?;

        {
            let mut slot = self
                .stream
                .lock()
                .map_err(|_| SessionError::Other("stream lock poisoned".to_string()))?;
            *slot = Some(SendableStream(stream));
        }

        self.capturing.store(true, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(100);
        let buffer = Arc::clone(&self.buffer);
        let capturing = Arc::clone(&self.capturing);
        let sample_rate = self.config.target_sample_rate;
        let channels = self.config.target_channels;
        let frame_ms = self.config.buffer_duration_ms;

        // Drain the callback buffer on a fixed cadence and emit frames.
        self.pump_task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(frame_ms));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut elapsed_ms: u64 = 0;

            loop {
                interval.tick().await;
                if !capturing.load(Ordering::SeqCst) {
                    break;
                }

                let samples = match buffer.lock() {
                    Ok(mut buf) => std::mem::take(&mut *buf),
                    Err(_) => break,
                };

                elapsed_ms += frame_ms;
                if samples.is_empty() {
                    continue;
                }

                let frame = AudioFrame {
                    samples,
                    sample_rate,
                    channels,
                    timestamp_ms: elapsed_ms,
                };
                if tx.send(frame).await.is_err() {
                    break;
                }
            }
        }));

        info!("Microphone capture started");

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if !self.capturing.load(Ordering::SeqCst) {
            return Ok(());
        }

        info!("Stopping microphone capture");

        self.capturing.store(false, Ordering::SeqCst);

        if let Some(task) = self.pump_task.take() {
            let _ = task.await;
        }

        // Dropping the stream releases the device.
        if let Ok(mut slot) = self.stream.lock() {
            slot.take();
        }

        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }

        info!("Microphone capture stopped");

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "cpal microphone"
    }
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Mix interleaved multi-channel audio down to mono and resample by
/// nearest-neighbor to the target rate.
pub(crate) fn mix_to_mono_and_resample(
    samples: &[i16],
    channels: usize,
    source_rate: u32,
    target_rate: u32,
) -> Vec<i16> {
    let mono: Vec<i16> = if channels <= 1 {
        samples.to_vec()
    } else {
        samples
            .chunks_exact(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                (sum / channels as i32) as i16
            })
            .collect()
    };

    if source_rate == target_rate || source_rate == 0 {
        return mono;
    }

    let out_len = (mono.len() as u64 * target_rate as u64 / source_rate as u64) as usize;
    (0..out_len)
        .map(|i| {
            let src = (i as u64 * source_rate as u64 / target_rate as u64) as usize;
            mono[src.min(mono.len().saturating_sub(1))]
        })
        .collect()
}
