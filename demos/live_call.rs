//! Drive a short live call against a running voice backend.
//!
//! Streams a WAV fixture as the caller's microphone, prints the transcript as
//! it arrives, and hangs up after ten seconds.
//!
//! Usage: cargo run --example live_call -- <fixture.wav> [host:port]

use clinic_console::{AudioSource, CallSession, SessionConfig, Speaker};
use std::path::PathBuf;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let fixture = args
        .next()
        .map(PathBuf::from)
        .ok_or_else(|| anyhow::anyhow!("usage: live_call <fixture.wav> [host:port]"))?;
    let addr = args.next().unwrap_or_else(|| "localhost:8000".to_string());

    let session = CallSession::new(SessionConfig {
        backend_addr: addr,
        source: AudioSource::File(fixture),
        playback_device: false,
        ..Default::default()
    });

    if let Err(e) = session.start().await {
        eprintln!("{}", e);
        return Ok(());
    }

    println!("Call live, streaming fixture for 10s...");

    let mut printed = 0;
    for _ in 0..20 {
        if !session.is_active() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;

        let items = session.transcript().await;
        for item in items.iter().skip(printed) {
            let who = match item.speaker {
                Speaker::User => "caller",
                Speaker::Agent => "agent",
            };
            println!("[{}] {}", who, item.text);
        }
        printed = items.len();
    }

    let stats = session.stop().await;
    println!(
        "Done: {} frames sent, {} responses played",
        stats.frames_sent, stats.payloads_played
    );

    Ok(())
}
