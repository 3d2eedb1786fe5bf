use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use voice_relay::{
    AudioBackendFactory, AudioRecorder, AudioSource, Config, ConnectionManager, MicrophoneBackend,
};

/// Stream microphone audio to a Socket.IO server in 5-second PCM chunks
#[derive(Parser, Debug)]
#[command(name = "voice-relay", version)]
struct Args {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = "config/voice-relay")]
    config: String,

    /// Server URL, overrides the configuration
    #[arg(short, long)]
    server: Option<String>,

    /// Replay a WAV file instead of capturing the microphone
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Pace file replay in real time
    #[arg(long, requires = "input")]
    realtime: bool,

    /// Input device name (default device if omitted)
    #[arg(short, long, conflicts_with = "input")]
    device: Option<String>,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    duration: Option<u64>,

    /// List input devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    if args.list_devices {
        for name in MicrophoneBackend::list_devices()? {
            println!("{}", name);
        }
        return Ok(());
    }

    let mut cfg = Config::load(&args.config)?;
    if let Some(url) = args.server {
        cfg.server.url = url;
    }

    info!("voice-relay v{}", env!("CARGO_PKG_VERSION"));
    info!("Server: {}", cfg.server.url);

    let source = match args.input {
        Some(path) => AudioSource::File {
            path,
            realtime: args.realtime,
        },
        None => AudioSource::Microphone {
            device: args.device,
        },
    };

    let mut connections = ConnectionManager::socket_io(cfg.server.url.clone());
    let backend = AudioBackendFactory::create(source, cfg.audio.clone(), &cfg.chunk)?;
    let mut recorder = AudioRecorder::new(backend, connections.get_or_create(), cfg.chunk.clone());

    recorder.start().await.context("Could not start recording")?;

    let duration = args.duration;
    let deadline = async move {
        match duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };

    match duration {
        Some(secs) => info!("Recording for {}s, press Ctrl-C to stop early", secs),
        None => info!("Recording, press Ctrl-C to stop"),
    }

    tokio::select! {
        _ = deadline => {}
        _ = recorder.finished() => info!("Audio source ended"),
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => info!("Interrupted"),
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        },
    }

    let stats = recorder.stop().await;
    connections.disconnect();

    // Give the connection task a moment to send the disconnect packet
    tokio::time::sleep(Duration::from_millis(100)).await;

    info!(
        "Done: {} frames, {} chunks emitted, {} dropped, {} samples",
        stats.frames_processed, stats.chunks_emitted, stats.chunks_dropped, stats.samples_emitted
    );

    Ok(())
}
