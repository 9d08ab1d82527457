//! pharmyrus-fusion - patent search service
//!
//! Loads configuration, wires the live upstream clients into a
//! `FusionEngine` and serves the HTTP API.

use anyhow::Result;
use clap::Parser;
use pharmyrus_common::config::{resolve_config_path, TomlConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use pharmyrus_fusion::{AppState, FusionEngine, TaskManager};

#[derive(Debug, Parser)]
#[command(name = "pharmyrus-fusion", version, about = "Pharmaceutical patent search service")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides [server] bind
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = resolve_config_path(cli.config.as_deref());
    let mut config = TomlConfig::load(config_path.as_deref())?;
    config.apply_env_overrides();
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting pharmyrus-fusion");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Config: {}", path.display()),
        None => info!("Config: compiled defaults"),
    }

    let engine = FusionEngine::from_config(&config)?;
    info!(
        default_country = %engine.settings().default_country,
        enrichment_order = ?engine.enrichment_order(),
        "Fusion engine ready"
    );

    let tasks = TaskManager::new(Arc::new(engine), Duration::from_secs(config.tasks.retention_secs));
    let app = pharmyrus_fusion::build_router(AppState::new(tasks)).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!("Listening on http://{}", config.server.bind);
    info!("Health check: http://{}/health", config.server.bind);

    axum::serve(listener, app).await?;

    Ok(())
}
