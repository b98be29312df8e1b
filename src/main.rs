use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use talkback::{
    create_router, AppState, AudioFormat, Collaborators, Config, MediaSourceFactory,
    SessionCommand, SessionConfig, SourceKind, VoiceSession,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "talkback", version, about = "Voice assistant client")]
struct Cli {
    /// Config file, without extension
    #[arg(long, default_value = "config/talkback")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one session in the foreground until Ctrl-C
    Listen {
        /// Stream this WAV file instead of the microphone
        #[arg(long)]
        wav: Option<PathBuf>,
    },
    /// Serve the HTTP control API
    Serve {
        /// Sessions stream this WAV file instead of the microphone
        #[arg(long)]
        wav: Option<PathBuf>,
    },
}

fn source_kind(wav: Option<PathBuf>) -> SourceKind {
    wav.map_or(SourceKind::Microphone, SourceKind::WavFile)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("talkback=info,tower_http=info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("Talkback v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    match cli.command {
        Command::Listen { wav } => listen(cfg, source_kind(wav)).await,
        Command::Serve { wav } => serve(cfg, source_kind(wav)).await,
    }
}

async fn listen(cfg: Config, source: SourceKind) -> Result<()> {
    let format = AudioFormat {
        sample_rate: cfg.audio.sample_rate,
        channels: cfg.audio.channels,
    };
    let media = MediaSourceFactory::create(source, format).context("Failed to create media source")?;
    let collaborators =
        Collaborators::from_config(&cfg).context("Failed to set up backend clients")?;
    let mut session = VoiceSession::new(SessionConfig::from(&cfg), collaborators, media);

    let mut updates = session.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(update) => println!("{update}"),
                Err(RecvError::Lagged(missed)) => warn!("Missed {} updates", missed),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let (stop_tx, stop_rx) = mpsc::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = stop_tx.send(SessionCommand::Stop).await;
        }
    });

    let stats = session.run(stop_rx).await.context("Session failed")?;
    drop(session);
    let _ = printer.await;

    info!(
        "Session {} lasted {:.1}s: {} exchanges, {} chunks sent, {} dropped",
        stats.session_id,
        stats.duration_secs,
        stats.exchanges_count,
        stats.chunks_sent,
        stats.chunks_dropped
    );

    Ok(())
}

async fn serve(cfg: Config, source: SourceKind) -> Result<()> {
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let app = create_router(AppState::from_config(cfg, source));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("HTTP control API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("HTTP server failed")?;

    Ok(())
}
