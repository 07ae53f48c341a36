use anyhow::Result;
use clap::{Parser, Subcommand};
use clinic_console::dashboard::{render_appointments, render_calls};
use clinic_console::{
    AudioSource, CallSession, Config, DashboardClient, SessionConfig, Speaker, TranscriptItem,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "clinic-console",
    about = "Live call monitor and dashboard for the clinic voice backend"
)]
struct Cli {
    /// Config file (without extension)
    #[arg(long, default_value = "config/clinic-console")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a live call session against the voice backend
    Call {
        /// Stream a WAV file instead of the microphone
        #[arg(long)]
        fixture: Option<PathBuf>,

        /// Save the microphone side of the call as WAV chunks
        #[arg(long)]
        record: bool,

        /// Do not open an output device for agent audio
        #[arg(long)]
        no_playback: bool,
    },

    /// Fetch and render appointments and call history
    Dashboard,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("clinic-console v0.1.0");
    info!("Voice backend: {}", cfg.backend.addr);

    match cli.command {
        Command::Call {
            fixture,
            record,
            no_playback,
        } => run_call(cfg, fixture, record, no_playback).await,
        Command::Dashboard => run_dashboard(cfg).await,
    }
}

async fn run_call(
    cfg: Config,
    fixture: Option<PathBuf>,
    record: bool,
    no_playback: bool,
) -> Result<()> {
    let mut session_config = SessionConfig {
        backend_addr: cfg.backend.addr.clone(),
        secure: cfg.backend.secure,
        frame_interval: Duration::from_millis(cfg.audio.frame_interval_ms),
        sample_rate: cfg.audio.sample_rate,
        channels: cfg.audio.channels,
        ..Default::default()
    };

    if let Some(path) = fixture {
        session_config.source = AudioSource::File(path);
    }
    if no_playback {
        session_config.playback_device = false;
    }
    if record || cfg.recording.enabled {
        session_config.record_dir = Some(PathBuf::from(&cfg.recording.path));
    }

    let session = CallSession::new(session_config);

    if let Err(e) = session.start().await {
        // Already classified; this is the user-facing message.
        eprintln!("{}", e);
        return Ok(());
    }

    println!("Call started. Press Ctrl-C to hang up.");

    let mut printed = 0usize;
    let mut last_status = session.status();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nHanging up...");
                break;
            }
            _ = tokio::time::sleep(Duration::from_millis(300)) => {
                if !session.is_active() {
                    break;
                }

                let status = session.status();
                if status != last_status {
                    println!("-- {} --", status);
                    last_status = status;
                }

                let items = session.transcript().await;
                printed = print_new_items(&items, printed);
            }
        }
    }

    let stats = session.stop().await;

    // Flush whatever arrived after the last poll, including the trailing
    // non-final item.
    let items = session.transcript().await;
    for item in items.iter().skip(printed) {
        print_item(item);
    }

    if let Some(err) = session.last_error().await {
        eprintln!("{}", err);
    }

    println!(
        "Call ended after {:.1}s: {} frames sent, {} responses played, {} transcript items",
        stats.duration_secs, stats.frames_sent, stats.payloads_played, stats.transcript_items
    );

    Ok(())
}

/// Print every item that is complete: all but the last, plus the last one if
/// it is final. A still-growing trailing item stays unprinted until it either
/// finalizes or something follows it.
fn print_new_items(items: &[TranscriptItem], mut printed: usize) -> usize {
    let settled = match items.last() {
        Some(last) if !last.is_final => items.len() - 1,
        _ => items.len(),
    };

    while printed < settled {
        print_item(&items[printed]);
        printed += 1;
    }

    printed
}

fn print_item(item: &TranscriptItem) {
    let who = match item.speaker {
        Speaker::User => "caller",
        Speaker::Agent => "agent",
    };
    println!("[{}] {}", who, item.text);
}

async fn run_dashboard(cfg: Config) -> Result<()> {
    let client = DashboardClient::new(cfg.api_base_url());

    // Fetch failures degrade to the empty-state tables; they never crash the
    // view.
    let slots = match client.appointments().await {
        Ok(slots) => slots,
        Err(e) => {
            warn!("Failed to fetch appointments: {:#}", e);
            Vec::new()
        }
    };

    let calls = match client.calls().await {
        Ok(calls) => calls,
        Err(e) => {
            warn!("Failed to fetch call history: {:#}", e);
            Vec::new()
        }
    };

    println!("{}", render_appointments(&slots));
    println!("{}", render_calls(&calls));

    Ok(())
}
