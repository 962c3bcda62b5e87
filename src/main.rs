use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use voice_intent::audio::encoder::mime_for_extension;
use voice_intent::{
    create_router, AppState, AudioDevice, CaptureHandle, CapturePipeline, Config, FileDevice,
    HttpTranscriber, IntentMode, IntentResolver, MemoryHost, Payload, SessionState, Transcriber,
};

#[derive(Parser)]
#[command(name = "voice-intent", version, about = "Voice capture and intent routing")]
struct Cli {
    /// Configuration file (without extension)
    #[arg(long, global = true, default_value = "config/voice-intent")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record one session, upload it and resolve the intent
    Record(RecordArgs),

    /// Upload an existing recording and resolve the intent
    Transcribe {
        file: PathBuf,

        #[arg(long, value_enum, default_value = "navigate")]
        mode: IntentMode,
    },

    /// Serve the HTTP control surface
    Serve(SourceArgs),
}

#[derive(Args)]
struct SourceArgs {
    /// WAV file replayed as the capture device
    #[arg(long, conflicts_with = "microphone")]
    input: Option<PathBuf>,

    /// Capture from the default system microphone
    #[arg(long)]
    microphone: bool,

    #[arg(long, value_enum, default_value = "navigate")]
    mode: IntentMode,

    /// Override the configured countdown
    #[arg(long)]
    countdown: Option<u32>,
}

#[derive(Args)]
struct RecordArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Stop automatically after this many seconds
    #[arg(long)]
    duration: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Record(args) => record(&cfg, args).await,
        Command::Transcribe { file, mode } => transcribe(&cfg, file, mode).await,
        Command::Serve(args) => serve(&cfg, args).await,
    }
}

fn open_device(source: &SourceArgs) -> Result<Arc<dyn AudioDevice>> {
    if source.microphone {
        return microphone_device();
    }
    match &source.input {
        Some(path) => Ok(Arc::new(FileDevice::new(path))),
        None => bail!("No capture source: pass --input <file.wav> or --microphone"),
    }
}

#[cfg(feature = "microphone")]
fn microphone_device() -> Result<Arc<dyn AudioDevice>> {
    Ok(Arc::new(voice_intent::audio::MicrophoneDevice::new()))
}

#[cfg(not(feature = "microphone"))]
fn microphone_device() -> Result<Arc<dyn AudioDevice>> {
    bail!("This build has no microphone support (enable the `microphone` feature)")
}

fn build_pipeline(
    cfg: &Config,
    source: &SourceArgs,
    host: Arc<MemoryHost>,
) -> Result<CapturePipeline> {
    let device = open_device(source)?;
    let transcriber = HttpTranscriber::for_mode(&cfg.transcription, source.mode)?;
    info!("Transcription endpoint: {}", transcriber.endpoint());

    let mut policy = cfg.capture.policy();
    if let Some(secs) = source.countdown {
        policy = policy.with_countdown(secs);
    }

    Ok(
        CapturePipeline::new(device, Arc::new(transcriber), source.mode, host)
            .with_policy(policy),
    )
}

async fn record(cfg: &Config, args: RecordArgs) -> Result<()> {
    let host = Arc::new(MemoryHost::new());
    let capture = build_pipeline(cfg, &args.source, host.clone())?.spawn();

    capture.start().await?;
    info!("Press Ctrl-C to stop recording");

    let deadline = async {
        match args.duration {
            Some(secs) => {
                capture
                    .wait_for(|s| s.state != SessionState::CountingDown)
                    .await?;
                tokio::time::sleep(Duration::from_secs(secs)).await;
                info!("Duration reached, stopping");
            }
            None => std::future::pending::<()>().await,
        }
        Ok::<_, anyhow::Error>(())
    };

    tokio::select! {
        _ = capture.settled() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            info!("Interrupted, stopping");
            finish(&capture).await;
        }
        reached = deadline => {
            reached?;
            finish(&capture).await;
        }
    }

    let snapshot = capture.settled().await?;
    capture.shutdown().await;

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    match args.source.mode {
        IntentMode::Navigate => {
            if let Some(target) = host.last_target() {
                println!("Navigate to: {}", target);
            }
        }
        IntentMode::ExtractFields => {
            println!("{}", serde_json::to_string_pretty(&host.form())?);
        }
    }

    if snapshot.state == SessionState::Failed {
        if let Some(error) = snapshot.error {
            bail!("Recording failed: {}", error.message);
        }
    }
    Ok(())
}

async fn finish(capture: &CaptureHandle) {
    // The session may have ended on its own in the meantime
    if let Err(e) = capture.finish().await {
        warn!("Could not stop capture: {}", e);
    }
}

async fn transcribe(cfg: &Config, file: PathBuf, mode: IntentMode) -> Result<()> {
    let bytes = tokio::fs::read(&file)
        .await
        .with_context(|| format!("Failed to read recording: {}", file.display()))?;

    let extension = file
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    let mime_type = mime_for_extension(extension).unwrap_or("application/octet-stream");
    let payload = Payload::new(bytes, mime_type);
    if payload.is_empty() {
        bail!("Recording is empty: {}", file.display());
    }

    let transcriber = HttpTranscriber::for_mode(&cfg.transcription, mode)?;
    let result = transcriber.submit(&payload).await?;

    let host = MemoryHost::new();
    let resolved = IntentResolver::new(mode).resolve(&result, &host);
    println!("{}", serde_json::to_string_pretty(&resolved)?);

    if mode == IntentMode::ExtractFields {
        println!("{}", serde_json::to_string_pretty(&host.form())?);
    }
    Ok(())
}

async fn serve(cfg: &Config, args: SourceArgs) -> Result<()> {
    let host = Arc::new(MemoryHost::new());
    let capture = build_pipeline(cfg, &args, host.clone())?.spawn();
    let app = create_router(AppState::new(capture.clone(), host));

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await
        .context("HTTP server error")?;

    capture.shutdown().await;
    info!("Server stopped");
    Ok(())
}
