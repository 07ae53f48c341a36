use super::config::SessionConfig;
use super::stats::{CallStatus, SessionStats, StatusCell};
use crate::audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, CallRecorder,
    PlaybackSink, RecorderConfig,
};
use crate::error::SessionError;
use crate::protocol::ControlMessage;
use crate::transcript::{Speaker, TranscriptItem, TranscriptLog};
use crate::transport::{self, EventStream, FrameSink, TransportEvent};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// The call session controller.
///
/// Owns every resource a live call depends on (capture backend, transport,
/// playback sink) and releases all of them on every exit path through one
/// teardown routine. `stop()` is idempotent and safe from any state,
/// including before startup completes.
pub struct CallSession {
    /// Session configuration
    config: SessionConfig,

    /// When the session object was created
    started_at: chrono::DateTime<chrono::Utc>,

    /// Whether a call is currently live
    active: Arc<AtomicBool>,

    /// IDLE / LISTENING / SPEAKING
    status: Arc<StatusCell>,

    /// Ordered transcript log, exposed read-only to rendering
    transcript: Arc<Mutex<TranscriptLog>>,

    /// Last classified error, surfaced as a user-visible status message
    last_error: Arc<Mutex<Option<SessionError>>>,

    /// Outbound frames sent so far
    frames_sent: Arc<AtomicUsize>,

    /// Inbound payloads decoded and queued so far
    payloads_played: Arc<AtomicUsize>,

    /// Capture device handle
    capture: Arc<Mutex<Option<Box<dyn AudioBackend>>>>,

    /// Playback sink handle
    playback: Arc<Mutex<Option<Arc<PlaybackSink>>>>,

    /// Handle for the outbound encoder task
    encoder_task: Arc<Mutex<Option<JoinHandle<()>>>>,

    /// Handle for the inbound multiplexer task
    inbound_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl CallSession {
    /// Create a session controller. No resources are acquired until
    /// `start()`.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            started_at: Utc::now(),
            active: Arc::new(AtomicBool::new(false)),
            status: Arc::new(StatusCell::new(CallStatus::Idle)),
            transcript: Arc::new(Mutex::new(TranscriptLog::new())),
            last_error: Arc::new(Mutex::new(None)),
            frames_sent: Arc::new(AtomicUsize::new(0)),
            payloads_played: Arc::new(AtomicUsize::new(0)),
            capture: Arc::new(Mutex::new(None)),
            playback: Arc::new(Mutex::new(None)),
            encoder_task: Arc::new(Mutex::new(None)),
            inbound_task: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the call.
    ///
    /// Acquires the capture device first (the step that may prompt for
    /// microphone permission), then opens the playback sink, then the
    /// transport. On any failure the classified error is stored for the UI,
    /// everything acquired so far is released, and the session stays idle.
    pub async fn start(&self) -> Result<(), SessionError> {
        if self.active.load(Ordering::SeqCst) {
            warn!("Call already active");
            return Ok(());
        }

        info!("Starting call session: {}", self.config.call_id);

        // A previous call's transport-closure teardown may still be
        // finishing; wait it out before acquiring anything.
        join_task(&self.inbound_task, "inbound").await;

        // A new call clears the previous session's transcript and error.
        self.transcript.lock().await.clear();
        *self.last_error.lock().await = None;
        self.frames_sent.store(0, Ordering::SeqCst);
        self.payloads_played.store(0, Ordering::SeqCst);

        // 1. Acquire capture before anything touches the network.
        let backend_config = AudioBackendConfig {
            target_sample_rate: self.config.sample_rate,
            target_channels: self.config.channels,
            buffer_duration_ms: 100,
        };

        let capture_rx = match self.acquire_capture(backend_config).await {
            Ok(rx) => rx,
            Err(e) => return Err(self.abort_start(e).await),
        };

        // 2. Playback sink (the session's audio output context).
        let sink = if self.config.playback_device {
            match PlaybackSink::open() {
                Ok(sink) => Arc::new(sink),
                Err(e) => return Err(self.abort_start(e).await),
            }
        } else {
            Arc::new(PlaybackSink::headless(
                self.config.sample_rate,
                self.config.channels,
            ))
        };
        *self.playback.lock().await = Some(Arc::clone(&sink));

        // 3. Open the transport last so a capture failure never leaves a
        // dangling connection.
        let (frame_sink, events) = match transport::connect(&self.config.transport_url()).await {
            Ok(pair) => pair,
            Err(e) => return Err(self.abort_start(e).await),
        };

        self.active.store(true, Ordering::SeqCst);
        self.status.set(CallStatus::Listening);

        let recorder = self.build_recorder();
        self.spawn_encoder(capture_rx, frame_sink, recorder).await;
        self.spawn_inbound(events, sink).await;

        info!("Call session started: {}", self.config.call_id);

        Ok(())
    }

    /// End the call. Always succeeds; safe to invoke repeatedly and from any
    /// state.
    pub async fn stop(&self) -> SessionStats {
        let was_active = self.active.swap(false, Ordering::SeqCst);
        if was_active {
            info!("Stopping call session: {}", self.config.call_id);
        } else {
            debug!("Stop requested with no active call");
        }

        self.status.set(CallStatus::Idle);

        // Release order: encoder (closes the transport on exit), inbound,
        // capture device, playback sink.
        join_task(&self.encoder_task, "encoder").await;
        join_task(&self.inbound_task, "inbound").await;
        release_capture(&self.capture).await;
        release_playback(&self.playback).await;

        if was_active {
            info!("Call session stopped: {}", self.config.call_id);
        }

        self.stats().await
    }

    /// Current lifecycle state.
    pub fn status(&self) -> CallStatus {
        self.status.get()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Snapshot of the transcript log.
    pub async fn transcript(&self) -> Vec<TranscriptItem> {
        self.transcript.lock().await.items().to_vec()
    }

    /// Last classified failure, if any. This is the user-visible message.
    pub async fn last_error(&self) -> Option<SessionError> {
        self.last_error.lock().await.clone()
    }

    /// Current session statistics.
    pub async fn stats(&self) -> SessionStats {
        let duration = Utc::now().signed_duration_since(self.started_at);
        let transcript_items = self.transcript.lock().await.len();

        SessionStats {
            status: self.status.get(),
            started_at: self.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            frames_sent: self.frames_sent.load(Ordering::SeqCst),
            payloads_played: self.payloads_played.load(Ordering::SeqCst),
            transcript_items,
        }
    }

    async fn acquire_capture(
        &self,
        backend_config: AudioBackendConfig,
    ) -> Result<mpsc::Receiver<AudioFrame>, SessionError> {
        let mut backend = AudioBackendFactory::create(self.config.source.clone(), backend_config)?;
        let rx = backend.start().await?;
        *self.capture.lock().await = Some(backend);
        Ok(rx)
    }

    /// Startup failure path: store the classified error, release whatever was
    /// acquired, stay idle.
    async fn abort_start(&self, err: SessionError) -> SessionError {
        error!("Failed to start call: {}", err);
        release_capture(&self.capture).await;
        release_playback(&self.playback).await;
        self.status.set(CallStatus::Idle);
        *self.last_error.lock().await = Some(err.clone());
        err
    }

    fn build_recorder(&self) -> Option<CallRecorder> {
        let dir = self.config.record_dir.clone()?;
        match CallRecorder::new(RecorderConfig::new(self.config.call_id.clone(), dir)) {
            Ok(recorder) => Some(recorder),
            Err(e) => {
                // Recording is best-effort; the call proceeds without it.
                warn!("Call recording disabled: {}", e);
                None
            }
        }
    }

    /// Outbound side: package captured audio into one binary frame per
    /// interval and hand it to the transport. Frames produced after transport
    /// closure are dropped silently; they are wall-clock audio, not
    /// replayable state.
    async fn spawn_encoder(
        &self,
        capture_rx: mpsc::Receiver<AudioFrame>,
        mut frame_sink: FrameSink,
        mut recorder: Option<CallRecorder>,
    ) {
        let active = Arc::clone(&self.active);
        let frames_sent = Arc::clone(&self.frames_sent);
        let frame_interval = self.config.frame_interval;
        let sample_rate = self.config.sample_rate;
        let channels = self.config.channels;

        let task = tokio::spawn(async move {
            debug!("Encoder task started");

            let mut interval = tokio::time::interval(frame_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            let mut capture_rx = Some(capture_rx);
            let mut pending: Vec<i16> = Vec::new();
            let mut elapsed_ms: u64 = 0;
            let mut transport_open = true;

            loop {
                let flush = match capture_rx.as_mut() {
                    Some(rx) => {
                        tokio::select! {
                            maybe = rx.recv() => {
                                match maybe {
                                    Some(frame) => {
                                        if let Some(rec) = recorder.as_mut() {
                                            if let Err(e) = rec.write_frame(&frame) {
                                                warn!("Recorder write failed: {}", e);
                                                recorder = None;
                                            }
                                        }
                                        pending.extend_from_slice(&frame.samples);
                                        false
                                    }
                                    None => {
                                        // Capture source drained (fixture end).
                                        capture_rx = None;
                                        false
                                    }
                                }
                            }
                            _ = interval.tick() => true,
                        }
                    }
                    None => {
                        interval.tick().await;
                        true
                    }
                };

                if !active.load(Ordering::SeqCst) {
                    break;
                }

                if !flush || pending.is_empty() {
                    continue;
                }

                elapsed_ms += frame_interval.as_millis() as u64;
                let frame = AudioFrame {
                    samples: std::mem::take(&mut pending),
                    sample_rate,
                    channels,
                    timestamp_ms: elapsed_ms,
                };

                if transport_open {
                    match frame_sink.send_frame(frame.to_pcm_bytes()).await {
                        Ok(()) => {
                            frames_sent.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(e) => {
                            debug!("Dropping frame after transport closure: {}", e);
                            transport_open = false;
                        }
                    }
                }
            }

            frame_sink.close().await;

            if let Some(rec) = recorder.take() {
                if let Err(e) = rec.finish() {
                    warn!("Failed to finalize call recording: {}", e);
                }
            }

            debug!("Encoder task stopped");
        });

        *self.encoder_task.lock().await = Some(task);
    }

    /// Inbound side: classify each transport message as audio or control and
    /// route it, strictly in arrival order. Decode and parse failures are
    /// logged and dropped; closure and transport errors end the session.
    async fn spawn_inbound(&self, mut events: EventStream, sink: Arc<PlaybackSink>) {
        let active = Arc::clone(&self.active);
        let status = Arc::clone(&self.status);
        let transcript = Arc::clone(&self.transcript);
        let last_error = Arc::clone(&self.last_error);
        let payloads_played = Arc::clone(&self.payloads_played);
        let capture = Arc::clone(&self.capture);
        let playback = Arc::clone(&self.playback);
        let encoder_task = Arc::clone(&self.encoder_task);

        let task = tokio::spawn(async move {
            debug!("Inbound task started");

            while let Some(event) = events.next_event().await {
                if !active.load(Ordering::SeqCst) {
                    break;
                }

                match event {
                    TransportEvent::Audio(payload) => {
                        // accept_payload resumes a suspended sink before
                        // attempting the decode.
                        match sink.accept_payload(&payload) {
                            Ok(_) => {
                                payloads_played.fetch_add(1, Ordering::SeqCst);
                            }
                            Err(e) => warn!("{}", e),
                        }
                    }
                    TransportEvent::Text(raw) => match ControlMessage::parse(&raw) {
                        Ok(ControlMessage::Transcript { text, is_final }) => {
                            transcript.lock().await.append(Speaker::User, &text, is_final);
                        }
                        Ok(ControlMessage::LlmChunk { text }) => {
                            status.set(CallStatus::Speaking);
                            transcript
                                .lock()
                                .await
                                .append_or_merge(Speaker::Agent, &text, false);
                        }
                        Err(e) => warn!("Dropping control message: {}", e),
                    },
                    TransportEvent::Closed {
                        code,
                        reason,
                        clean,
                    } => {
                        if !clean {
                            let err = SessionError::AbnormalClosure {
                                code: code.unwrap_or(1006),
                                reason,
                            };
                            warn!("{}", err);
                            *last_error.lock().await = Some(err);
                        } else {
                            info!("Call transport closed by peer");
                        }
                        break;
                    }
                    TransportEvent::Failed(message) => {
                        let err = SessionError::ConnectionFailed(message);
                        error!("{}", err);
                        *last_error.lock().await = Some(err);
                        break;
                    }
                }
            }

            // Transport-initiated teardown. Every handle is taken out of its
            // slot before the active flag clears: once is_active() reads
            // false a new start() may refill the slots, and this task must
            // only ever touch the handles of the session that just ended.
            let stale_encoder = encoder_task.lock().await.take();
            let stale_capture = capture.lock().await.take();
            let stale_playback = playback.lock().await.take();

            status.set(CallStatus::Idle);
            let was_active = active.swap(false, Ordering::SeqCst);

            if let Some(task) = stale_encoder {
                if let Err(e) = task.await {
                    error!("encoder task panicked: {}", e);
                }
            }
            if let Some(mut backend) = stale_capture {
                if let Err(e) = backend.stop().await {
                    error!("Failed to stop capture backend: {}", e);
                }
            }
            if let Some(sink) = stale_playback {
                sink.close();
            }

            if was_active {
                info!("Call session torn down after transport closure");
            }

            debug!("Inbound task stopped");
        });

        *self.inbound_task.lock().await = Some(task);
    }
}

async fn join_task(slot: &Mutex<Option<JoinHandle<()>>>, name: &str) {
    let task = slot.lock().await.take();
    if let Some(task) = task {
        if let Err(e) = task.await {
            error!("{} task panicked: {}", name, e);
        }
    }
}

async fn release_capture(slot: &Mutex<Option<Box<dyn AudioBackend>>>) {
    let backend = slot.lock().await.take();
    if let Some(mut backend) = backend {
        if let Err(e) = backend.stop().await {
            error!("Failed to stop capture backend: {}", e);
        }
    }
}

async fn release_playback(slot: &Mutex<Option<Arc<PlaybackSink>>>) {
    let sink = slot.lock().await.take();
    if let Some(sink) = sink {
        sink.close();
    }
}

impl Drop for CallSession {
    fn drop(&mut self) {
        // Handles are released by their own tasks once the flag clears; this
        // covers a session dropped without stop().
        self.active.store(false, Ordering::SeqCst);
        self.status.set(CallStatus::Idle);
    }
}
