//! Platform node daemon.
//!
//! Reads lifecycle requests as JSON lines on stdin and writes one JSON
//! response line per request to stdout. Logs go to stderr.
//!
//! Usage:
//!   platform-node --config platform.toml

mod server;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use platform_abci::{AbciApplication, BlockExecutionPipeline, MemoryCoreChain};
use platform_config::{LogFormat, LoggingConfig, PlatformConfig, StorageBackend, StorageConfig};
use platform_store::{AuthenticatedStore, MemoryStore};
use tokio::io::{stdin, stdout, BufReader};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "platform-node", about = "Platform block execution node", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short = 'c', env = "PLATFORM_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Overrides the storage backend (memory, sled).
    #[arg(long, value_name = "BACKEND", env = "PLATFORM_BACKEND")]
    backend: Option<StorageBackend>,

    /// Overrides the storage path.
    #[arg(long, value_name = "PATH", env = "PLATFORM_STORAGE")]
    storage: Option<PathBuf>,

    /// Overrides the core chain snapshot file.
    #[arg(long, value_name = "PATH", env = "PLATFORM_CORE_SNAPSHOT")]
    core_snapshot: Option<PathBuf>,

    /// Overrides the log level or filter directive.
    #[arg(long, value_name = "LEVEL", env = "PLATFORM_LOG_LEVEL")]
    log_level: Option<String>,

    /// Emit logs as JSON.
    #[arg(long, env = "PLATFORM_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => PlatformConfig::load(path)
            .with_context(|| format!("failed to load configuration {}", path.display()))?,
        None => PlatformConfig::default(),
    };

    if let Some(backend) = cli.backend {
        config.storage.backend = backend;
    }
    if let Some(path) = &cli.storage {
        config.storage.path = Some(path.clone());
    }
    if let Some(path) = &cli.core_snapshot {
        config.abci.core_snapshot_path = Some(path.clone());
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if cli.log_json {
        config.logging.format = LogFormat::Json;
    }
    config.validate().context("invalid configuration")?;

    init_tracing(&config.logging);
    info!(
        chain_id = %config.abci.chain_id,
        backend = %config.storage.backend,
        version = env!("CARGO_PKG_VERSION"),
        "starting platform node"
    );

    let core = match &config.abci.core_snapshot_path {
        Some(path) => MemoryCoreChain::load(path)
            .with_context(|| format!("failed to load core snapshot {}", path.display()))?,
        None => {
            warn!("no core snapshot configured, the masternode list starts empty");
            MemoryCoreChain::new()
        }
    };
    let store = open_store(&config.storage)?;
    let pipeline = BlockExecutionPipeline::new(config.abci.clone(), store, Arc::new(core))
        .context("failed to open the block execution pipeline")?;
    let app = AbciApplication::new(pipeline);

    tokio::select! {
        served = server::serve(&app, BufReader::new(stdin()), stdout()) => {
            let handled = served?;
            info!(handled, "request stream closed");
        }
        _ = signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    app.pipeline()
        .lock()
        .await
        .store()
        .flush()
        .context("failed to flush storage")?;
    info!("platform node stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},platform={}", logging.level, logging.level)));

    let builder = fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_ansi(false);

    match logging.format {
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
        LogFormat::Plain => {
            let _ = builder.try_init();
        }
    }
}

fn open_store(storage: &StorageConfig) -> Result<Arc<dyn AuthenticatedStore>> {
    match storage.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::in_memory())),
        #[cfg(feature = "sled")]
        StorageBackend::Sled => {
            let path = storage
                .path
                .as_ref()
                .context("storage.path is required for the sled backend")?;
            let store = platform_store::SledStore::open(path)
                .with_context(|| format!("failed to open sled store at {}", path.display()))?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "sled"))]
        StorageBackend::Sled => anyhow::bail!("sled backend requested but the node was built without the `sled` feature"),
    }
}
