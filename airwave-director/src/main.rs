//! Airwave Director - main entry point
//!
//! Loads configuration, wires the collaborators, and serves the HTTP
//! control API. The show itself starts on `POST /show/start`, or right
//! away with `--autostart`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use airwave_common::config::{DirectorConfig, GeneratorDialect};
use airwave_director::providers::download::HttpDownloader;
use airwave_director::providers::llm::LlmGenerator;
use airwave_director::providers::offline::{OfflineMediaProvider, SilentSynthesizer, SimulatedAudioOutput};
use airwave_director::providers::scripted::ScriptedGenerator;
use airwave_director::providers::snapshot::SqliteSnapshotSink;
use airwave_director::providers::{ContentGenerator, MediaDownloader, Providers, SnapshotSink};
use airwave_director::{api, ShowScheduler};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DialectArg {
    Openai,
    Gemini,
    Scripted,
}

impl From<DialectArg> for GeneratorDialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Openai => GeneratorDialect::OpenAi,
            DialectArg::Gemini => GeneratorDialect::Gemini,
            DialectArg::Scripted => GeneratorDialect::Scripted,
        }
    }
}

/// Command-line arguments for airwave-director
#[derive(Parser, Debug)]
#[command(name = "airwave-director")]
#[command(about = "Continuous AI radio show director")]
#[command(version)]
struct Args {
    /// Config file (overrides AIRWAVE_CONFIG and the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "AIRWAVE_PORT")]
    port: Option<u16>,

    /// Show theme handed to the content generator
    #[arg(long, env = "AIRWAVE_THEME")]
    theme: Option<String>,

    /// Content generator backend
    #[arg(long, value_enum, env = "AIRWAVE_GENERATOR")]
    generator: Option<DialectArg>,

    /// SQLite file for session snapshots
    #[arg(long, env = "AIRWAVE_SNAPSHOT_DB")]
    snapshot_db: Option<PathBuf>,

    /// Start the show immediately
    #[arg(long)]
    autostart: bool,
}

impl Args {
    fn apply(&self, config: &mut DirectorConfig) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(theme) = &self.theme {
            config.show.theme = Some(theme.clone());
        }
        if let Some(generator) = self.generator {
            config.generator.dialect = generator.into();
        }
        if let Some(path) = &self.snapshot_db {
            config.persistence.snapshot_db = Some(path.clone());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "airwave_director=debug,airwave_common=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = DirectorConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    info!(
        "Starting Airwave Director v{} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH")
    );

    let providers = build_providers(&config).await?;
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
        .parse()
        .context("Invalid bind address")?;

    let scheduler = ShowScheduler::new(config, providers);
    if args.autostart {
        scheduler.start().context("Failed to start show")?;
    }

    api::run(addr, Arc::clone(&scheduler), shutdown_signal())
        .await
        .context("Server error")?;

    if scheduler.stop() {
        scheduler.join().await;
    }
    info!("Shutdown complete");
    Ok(())
}

/// Wire the configured collaborators
async fn build_providers(config: &DirectorConfig) -> Result<Providers> {
    let generator: Arc<dyn ContentGenerator> = match config.generator.dialect {
        GeneratorDialect::Scripted => {
            let dir = config
                .generator
                .scripted_dir
                .clone()
                .context("generator.scripted_dir is required for the scripted generator")?;
            info!("Using scripted timelines from {}", dir.display());
            Arc::new(ScriptedGenerator::new(dir))
        }
        GeneratorDialect::OpenAi | GeneratorDialect::Gemini => {
            info!("Using {:?} generator ({})", config.generator.dialect, config.generator.model);
            Arc::new(LlmGenerator::from_config(config.generator.clone()).context("Failed to create content generator")?)
        }
    };

    let media = Arc::new(OfflineMediaProvider::new());
    let downloader: Arc<dyn MediaDownloader> = Arc::new(
        HttpDownloader::new(Duration::from_secs(60))
            .context("Failed to create HTTP client")?
            .with_fallback(media.clone()),
    );

    let snapshots: Option<Arc<dyn SnapshotSink>> = match &config.persistence.snapshot_db {
        Some(path) => match SqliteSnapshotSink::open(path).await {
            Ok(sink) => Some(Arc::new(sink)),
            Err(e) => {
                warn!("Session snapshots disabled: {}", e);
                None
            }
        },
        None => None,
    };

    Ok(Providers {
        generator,
        synthesizer: Arc::new(SilentSynthesizer::new()),
        media,
        downloader,
        output: Arc::new(SimulatedAudioOutput::new()),
        snapshots,
    })
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
