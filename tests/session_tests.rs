// Integration tests for the call session controller
//
// A scripted WebSocket server stands in for the voice backend, and a WAV
// fixture stands in for the microphone, so the full start/stream/teardown
// lifecycle runs without any audio hardware or network beyond loopback.

use clinic_console::audio::AudioSource;
use clinic_console::error::SessionError;
use clinic_console::session::{CallSession, CallStatus, SessionConfig};
use clinic_console::Speaker;
use futures::{SinkExt, StreamExt};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// Scripted stand-in for the voice backend. Accepts connections one at a
/// time, counts inbound binary frames, and forwards messages from the script
/// channel to the connected client.
async fn run_server(
    listener: TcpListener,
    mut script_rx: mpsc::Receiver<Message>,
    binary_count: Arc<AtomicUsize>,
) {
    loop {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let Ok(mut ws) = accept_async(stream).await else {
            continue;
        };

        loop {
            tokio::select! {
                msg = ws.next() => match msg {
                    Some(Ok(Message::Binary(_))) => {
                        binary_count.fetch_add(1, Ordering::SeqCst);
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                },
                cmd = script_rx.recv() => match cmd {
                    Some(msg) => {
                        if ws.send(msg).await.is_err() {
                            break;
                        }
                    }
                    None => return,
                },
            }
        }
    }
}

async fn spawn_server() -> (String, mpsc::Sender<Message>, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let (script_tx, script_rx) = mpsc::channel(32);
    let binary_count = Arc::new(AtomicUsize::new(0));
    tokio::spawn(run_server(listener, script_rx, Arc::clone(&binary_count)));
    (addr, script_tx, binary_count)
}

/// Two seconds of silence at 16kHz, enough to outlive every test.
fn write_fixture(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("caller.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for _ in 0..32000 {
        writer.write_sample(0i16).unwrap();
    }
    writer.finalize().unwrap();
    path
}

fn session_config(addr: &str, fixture: &Path) -> SessionConfig {
    SessionConfig {
        backend_addr: addr.to_string(),
        source: AudioSource::File(fixture.to_path_buf()),
        playback_device: false,
        frame_interval: Duration::from_millis(50),
        ..Default::default()
    }
}

fn wav_payload(samples: &[i16]) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

fn transcript_json(text: &str, is_final: bool) -> Message {
    Message::text(format!(
        r#"{{"type":"transcript","text":"{}","is_final":{}}}"#,
        text, is_final
    ))
}

fn llm_chunk_json(text: &str) -> Message {
    Message::text(format!(r#"{{"type":"llm_chunk","text":"{}"}}"#, text))
}

#[tokio::test]
async fn test_start_transitions_to_listening() {
    let dir = TempDir::new().unwrap();
    let fixture = write_fixture(&dir);
    let (addr, _script, _frames) = spawn_server().await;

    let session = CallSession::new(session_config(&addr, &fixture));
    assert_eq!(session.status(), CallStatus::Idle);

    session.start().await.unwrap();
    assert_eq!(session.status(), CallStatus::Listening);
    assert!(session.is_active());
    assert!(session.last_error().await.is_none());

    let stats = session.stop().await;
    assert_eq!(stats.status, CallStatus::Idle);
    assert_eq!(session.status(), CallStatus::Idle);
    assert!(!session.is_active());
}

#[tokio::test]
async fn test_stop_twice_is_noop() {
    let dir = TempDir::new().unwrap();
    let fixture = write_fixture(&dir);
    let (addr, _script, _frames) = spawn_server().await;

    let session = CallSession::new(session_config(&addr, &fixture));
    session.start().await.unwrap();

    session.stop().await;
    let stats = session.stop().await;

    assert_eq!(stats.status, CallStatus::Idle);
    assert!(!session.is_active());
}

#[tokio::test]
async fn test_stop_before_start_is_safe() {
    let dir = TempDir::new().unwrap();
    let fixture = write_fixture(&dir);

    let session = CallSession::new(session_config("127.0.0.1:1", &fixture));
    let stats = session.stop().await;

    assert_eq!(stats.status, CallStatus::Idle);
    assert_eq!(stats.frames_sent, 0);
}

#[tokio::test]
async fn test_control_messages_build_transcript() {
    let dir = TempDir::new().unwrap();
    let fixture = write_fixture(&dir);
    let (addr, script, _frames) = spawn_server().await;

    let session = CallSession::new(session_config(&addr, &fixture));
    session.start().await.unwrap();

    script.send(transcript_json("hi", true)).await.unwrap();
    script.send(llm_chunk_json("he")).await.unwrap();
    script.send(llm_chunk_json("llo")).await.unwrap();
    script.send(transcript_json("bye", false)).await.unwrap();

    let mut items = Vec::new();
    for _ in 0..100 {
        items = session.transcript().await;
        if items.len() == 3 && items[1].text == "hello" {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(items.len(), 3);
    assert_eq!(items[0].speaker, Speaker::User);
    assert_eq!(items[0].text, "hi");
    assert!(items[0].is_final);
    assert_eq!(items[1].speaker, Speaker::Agent);
    assert_eq!(items[1].text, "hello");
    assert!(!items[1].is_final);
    assert_eq!(items[2].speaker, Speaker::User);
    assert_eq!(items[2].text, "bye");
    assert!(!items[2].is_final);

    // llm_chunk flips the status; it stays SPEAKING until the session ends.
    assert_eq!(session.status(), CallStatus::Speaking);

    session.stop().await;
    assert_eq!(session.status(), CallStatus::Idle);
}

#[tokio::test]
async fn test_unparseable_control_message_is_dropped() {
    let dir = TempDir::new().unwrap();
    let fixture = write_fixture(&dir);
    let (addr, script, _frames) = spawn_server().await;

    let session = CallSession::new(session_config(&addr, &fixture));
    session.start().await.unwrap();

    script.send(Message::text("{{{ not json")).await.unwrap();
    script
        .send(Message::text(r#"{"type":"mystery","text":"?"}"#))
        .await
        .unwrap();
    script.send(transcript_json("still here", true)).await.unwrap();

    let mut items = Vec::new();
    for _ in 0..100 {
        items = session.transcript().await;
        if !items.is_empty() {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }

    // Only the valid message landed; the session survived the bad ones.
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].text, "still here");
    assert!(session.is_active());
    assert_eq!(session.status(), CallStatus::Listening);
    assert!(session.last_error().await.is_none());

    session.stop().await;
}

#[tokio::test]
async fn test_binary_payloads_are_played_and_bad_ones_dropped() {
    let dir = TempDir::new().unwrap();
    let fixture = write_fixture(&dir);
    let (addr, script, _frames) = spawn_server().await;

    let session = CallSession::new(session_config(&addr, &fixture));
    session.start().await.unwrap();

    script
        .send(Message::binary(b"not a wav payload".to_vec()))
        .await
        .unwrap();
    script
        .send(Message::binary(wav_payload(&[1i16; 160])))
        .await
        .unwrap();

    let mut played = 0;
    for _ in 0..100 {
        played = session.stats().await.payloads_played;
        if played >= 1 {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }

    // The decode failure was logged and dropped; only the valid payload
    // counts, and the session is unaffected.
    assert_eq!(played, 1);
    assert!(session.is_active());
    assert!(session.last_error().await.is_none());

    session.stop().await;
}

#[tokio::test]
async fn test_outbound_frames_reach_server() {
    let dir = TempDir::new().unwrap();
    let fixture = write_fixture(&dir);
    let (addr, _script, frames) = spawn_server().await;

    let session = CallSession::new(session_config(&addr, &fixture));
    session.start().await.unwrap();

    let mut seen = 0;
    for _ in 0..100 {
        seen = frames.load(Ordering::SeqCst);
        if seen >= 2 {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }

    assert!(seen >= 2, "expected at least 2 audio frames, saw {}", seen);

    let stats = session.stop().await;
    assert!(stats.frames_sent >= 2);
}

#[tokio::test]
async fn test_restart_clears_previous_transcript_and_error() {
    let dir = TempDir::new().unwrap();
    let fixture = write_fixture(&dir);
    let (addr, script, _frames) = spawn_server().await;

    let session = CallSession::new(session_config(&addr, &fixture));
    session.start().await.unwrap();
    script.send(transcript_json("first call", true)).await.unwrap();

    for _ in 0..100 {
        if !session.transcript().await.is_empty() {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(session.transcript().await.len(), 1);

    session.stop().await;

    // The server accepts a second connection for the new call.
    session.start().await.unwrap();
    assert!(session.transcript().await.is_empty());
    assert!(session.last_error().await.is_none());
    assert_eq!(session.status(), CallStatus::Listening);

    session.stop().await;
}

#[tokio::test]
async fn test_connect_failure_is_classified_and_leaves_idle() {
    let dir = TempDir::new().unwrap();
    let fixture = write_fixture(&dir);

    // Grab a port with no listener behind it.
    let dead_addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().to_string()
    };

    let session = CallSession::new(session_config(&dead_addr, &fixture));
    let err = session.start().await.unwrap_err();

    assert!(matches!(err, SessionError::ConnectionFailed(_)));
    assert_eq!(session.status(), CallStatus::Idle);
    assert!(!session.is_active());
    assert!(matches!(
        session.last_error().await,
        Some(SessionError::ConnectionFailed(_))
    ));
}

#[tokio::test]
async fn test_capture_failure_makes_no_connection_attempt() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let missing = PathBuf::from("/nonexistent/microphone.wav");
    let session = CallSession::new(session_config(&addr, &missing));
    let err = session.start().await.unwrap_err();

    assert!(matches!(err, SessionError::DeviceNotFound(_)));
    assert_eq!(session.status(), CallStatus::Idle);

    // Capture is acquired before the transport: no connection was opened.
    let attempt = timeout(Duration::from_millis(250), listener.accept()).await;
    assert!(attempt.is_err(), "no connection attempt expected");
}

#[tokio::test]
async fn test_abnormal_closure_surfaces_error_and_tears_down() {
    let dir = TempDir::new().unwrap();
    let fixture = write_fixture(&dir);
    let (addr, script, _frames) = spawn_server().await;

    let session = CallSession::new(session_config(&addr, &fixture));
    session.start().await.unwrap();

    script
        .send(Message::Close(Some(CloseFrame {
            code: CloseCode::Error,
            reason: "backend failure".into(),
        })))
        .await
        .unwrap();

    for _ in 0..100 {
        if !session.is_active() {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }

    assert!(!session.is_active());
    assert_eq!(session.status(), CallStatus::Idle);
    match session.last_error().await {
        Some(SessionError::AbnormalClosure { code, .. }) => assert_eq!(code, 1011),
        other => panic!("expected abnormal closure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_restart_right_after_remote_close_keeps_streaming() {
    let dir = TempDir::new().unwrap();
    let fixture = write_fixture(&dir);
    let (addr, script, frames) = spawn_server().await;

    let session = CallSession::new(session_config(&addr, &fixture));
    session.start().await.unwrap();

    script
        .send(Message::Close(Some(CloseFrame {
            code: CloseCode::Error,
            reason: "backend failure".into(),
        })))
        .await
        .unwrap();

    for _ in 0..400 {
        if !session.is_active() {
            break;
        }
        sleep(Duration::from_millis(5)).await;
    }
    assert!(!session.is_active());

    // Restart the instant the active flag drops. The previous teardown may
    // still be finishing behind us; it must not touch the new session's
    // capture or playback.
    session.start().await.unwrap();
    assert!(session.is_active());
    assert_eq!(session.status(), CallStatus::Listening);

    let before = frames.load(Ordering::SeqCst);
    let mut after = before;
    for _ in 0..100 {
        after = frames.load(Ordering::SeqCst);
        if after > before {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    assert!(after > before, "restarted session sent no audio frames");

    session.stop().await;
}

#[tokio::test]
async fn test_clean_closure_ends_session_without_error() {
    let dir = TempDir::new().unwrap();
    let fixture = write_fixture(&dir);
    let (addr, script, _frames) = spawn_server().await;

    let session = CallSession::new(session_config(&addr, &fixture));
    session.start().await.unwrap();

    script
        .send(Message::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        })))
        .await
        .unwrap();

    for _ in 0..100 {
        if !session.is_active() {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }

    assert!(!session.is_active());
    assert_eq!(session.status(), CallStatus::Idle);
    assert!(session.last_error().await.is_none());
}

#[tokio::test]
async fn test_start_while_active_is_guarded() {
    let dir = TempDir::new().unwrap();
    let fixture = write_fixture(&dir);
    let (addr, _script, _frames) = spawn_server().await;

    let session = CallSession::new(session_config(&addr, &fixture));
    session.start().await.unwrap();

    // Second start is a no-op, not a second connection/session.
    session.start().await.unwrap();
    assert_eq!(session.status(), CallStatus::Listening);

    session.stop().await;
}
