//! Playback sequencer for synthesized audio responses
//!
//! Decoded payloads feed a single sample queue that the output device drains
//! in order, so each response buffer starts no earlier than the end of the
//! previous one and two payloads arriving close together can never overlap.
//! The sink can run headless (queue only) where no output device exists.

use super::mic::mix_to_mono_and_resample;
use crate::error::{Result, SessionError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use hound::WavReader;
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is only touched through the surrounding Mutex and never
/// crosses thread boundaries while borrowed.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// One decoded audio payload, ready to queue.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Decode an inbound binary payload (WAV container) to PCM samples.
pub fn decode_payload(bytes: &[u8]) -> Result<DecodedAudio> {
    let reader = WavReader::new(Cursor::new(bytes))
        .map_err(|e| SessionError::AudioDecode(e.to_string()))?;

    let spec = reader.spec();
    let samples: Vec<i16> = reader
        .into_samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| SessionError::AudioDecode(e.to_string()))?;

    Ok(DecodedAudio {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

/// Output sink with an explicit playback queue.
pub struct PlaybackSink {
    /// Single-writer queue drained in order by the device callback.
    queue: Arc<Mutex<VecDeque<i16>>>,
    stream: Mutex<Option<SendableStream>>,
    suspended: AtomicBool,
    /// Output format the queue is normalized to.
    sample_rate: u32,
    channels: u16,
    payloads_accepted: AtomicUsize,
}

impl PlaybackSink {
    /// Open the default output device and start draining the queue.
    pub fn open() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| SessionError::Other("no output device available".to_string()))?;

        let default_config = device
            .default_output_config()
            .map_err(|e| SessionError::Other(format!("failed to query output config: {}", e)))?;

        let sample_rate = default_config.sample_rate();
        let channels = default_config.channels();
        let stream_config: cpal::StreamConfig = default_config.clone().into();

        let queue: Arc<Mutex<VecDeque<i16>>> = Arc::new(Mutex::new(VecDeque::new()));

        let err_callback = |err| {
            warn!("Audio output stream error: {}", err);
        };

        let stream = match default_config.sample_format() {
            cpal::SampleFormat::I16 => {
                let queue = Arc::clone(&queue);
                device
                    .build_output_stream(
                        &stream_config,
                        move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                            let mut q = match queue.lock() {
                                Ok(q) => q,
                                Err(_) => return,
                            };
                            for slot in data.iter_mut() {
                                *slot = q.pop_front().unwrap_or(0);
                            }
                        },
                        err_callback,
                        None,
                    )
                    .map_err(|e| SessionError::Other(format!("output stream: {}", e)))?
            }
            cpal::SampleFormat::F32 => {
                let queue = Arc::clone(&queue);
                device
                    .build_output_stream(
                        &stream_config,
                        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                            let mut q = match queue.lock() {
                                Ok(q) => q,
                                Err(_) => return,
                            };
                            for slot in data.iter_mut() {
                                *slot =
                                    q.pop_front().map(|s| s as f32 / 32768.0).unwrap_or(0.0);
                            }
                        },
                        err_callback,
                        None,
                    )
                    .map_err(|e| SessionError::Other(format!("output stream: {}", e)))?
            }
            fmt => {
                return Err(SessionError::Other(format!(
                    "unsupported output sample format: {:?}",
                    fmt
                )))
            }
        };

        stream
            .play()
            .map_err(|e| SessionError::Other(e.to_string()))?;

        info!(
            "Playback sink opened: {}Hz, {} channels",
            sample_rate, channels
        );

        Ok(Self {
            queue,
            stream: Mutex::new(Some(SendableStream(stream))),
            suspended: AtomicBool::new(false),
            sample_rate,
            channels,
            payloads_accepted: AtomicUsize::new(0),
        })
    }

    /// A sink with no output device; decoded audio is only queued.
    /// Used in tests and headless environments.
    pub fn headless(sample_rate: u32, channels: u16) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            stream: Mutex::new(None),
            suspended: AtomicBool::new(false),
            sample_rate,
            channels,
            payloads_accepted: AtomicUsize::new(0),
        }
    }

    /// Decode one inbound payload and schedule it after everything already
    /// queued.
    ///
    /// If the sink is suspended it is resumed first, before decode is
    /// attempted. Decode failures leave the queue untouched.
    pub fn accept_payload(&self, bytes: &[u8]) -> Result<usize> {
        if self.is_suspended() {
            self.resume();
        }

        let decoded = decode_payload(bytes)?;
        let queued = self.enqueue(decoded);
        self.payloads_accepted.fetch_add(1, Ordering::SeqCst);
        Ok(queued)
    }

    /// Queue decoded audio, normalized to the sink's output format.
    fn enqueue(&self, audio: DecodedAudio) -> usize {
        let mono = mix_to_mono_and_resample(
            &audio.samples,
            audio.channels as usize,
            audio.sample_rate,
            self.sample_rate,
        );

        let mut queued = 0;
        if let Ok(mut q) = self.queue.lock() {
            for sample in mono {
                // Duplicate mono across all output channels.
                for _ in 0..self.channels {
                    q.push_back(sample);
                }
                queued += self.channels as usize;
            }
        }
        queued
    }

    /// Pause the output stream without releasing it.
    pub fn suspend(&self) {
        if let Ok(slot) = self.stream.lock() {
            if let Some(stream) = slot.as_ref() {
                if let Err(e) = stream.0.pause() {
                    warn!("Failed to pause output stream: {}", e);
                }
            }
        }
        self.suspended.store(true, Ordering::SeqCst);
    }

    /// Resume a suspended output stream.
    pub fn resume(&self) {
        if let Ok(slot) = self.stream.lock() {
            if let Some(stream) = slot.as_ref() {
                if let Err(e) = stream.0.play() {
                    warn!("Failed to resume output stream: {}", e);
                }
            }
        }
        self.suspended.store(false, Ordering::SeqCst);
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }

    /// Samples still waiting to be played.
    pub fn queued_samples(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    /// Payloads accepted (decoded and queued) so far.
    pub fn payloads_accepted(&self) -> usize {
        self.payloads_accepted.load(Ordering::SeqCst)
    }

    /// Release the output device and drop any unplayed audio.
    pub fn close(&self) {
        if let Ok(mut slot) = self.stream.lock() {
            slot.take();
        }
        if let Ok(mut q) = self.queue.lock() {
            q.clear();
        }
    }
}
