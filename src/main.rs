use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use blossom_kiosk::device::{
    CommandAudioDevice, CommandCamera, CommandMicrophone, CommandSynthesizer,
};
use blossom_kiosk::{
    create_router, AppState, Config, Language, NatsChannel, SessionDeps, SessionStateMachine,
    UiIntent,
};

/// Blossom kiosk - voice interaction controller
#[derive(Parser)]
#[command(name = "blossom-kiosk", version, about)]
struct Args {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = "config/blossom-kiosk")]
    config: String,

    /// Override the starting language (ko, en, ja, zh)
    #[arg(short, long)]
    language: Option<Language>,

    /// Override the NATS server URL
    #[arg(long, env = "BLOSSOM_NATS_URL")]
    nats_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("Blossom Kiosk v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    let mut session_config = cfg.session_config();
    if let Some(language) = args.language {
        session_config.language = language;
    }
    let nats_url = args.nats_url.unwrap_or_else(|| cfg.channel.nats_url.clone());

    let channel = NatsChannel::connect(&nats_url, cfg.channel.subject_prefix.clone())
        .await
        .with_context(|| format!("failed to connect to {}", nats_url))?;

    let devices = &cfg.devices;
    let deps = SessionDeps {
        channel: Arc::new(channel),
        audio: Arc::new(CommandAudioDevice::new(
            &devices.playback_route,
            &devices.capture_route,
            &devices.cue_player,
            &cfg.audio.recordings_path,
        )),
        synthesizer: Arc::new(CommandSynthesizer::new(&devices.speak)?),
        microphone: Arc::new(CommandMicrophone::new(
            &devices.record,
            &cfg.audio.recordings_path,
            &session_config.upload_format,
        )?),
        camera: Arc::new(CommandCamera::new(&devices.snapshot)?),
    };

    let (session, controller) = SessionStateMachine::spawn(deps, session_config);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Control API listening on {}", addr);

    let app = create_router(AppState::new(session.clone()));
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for ctrl-c: {}", e);
            }
            info!("Shutting down");
        })
        .await
        .context("control API failed")?;

    // Ignored if the controller is already gone
    let _ = session.send(UiIntent::Shutdown);
    controller.await.context("session controller panicked")?;

    Ok(())
}
