use std::sync::Arc;

use clap::Parser;
use fleet_relay::{
    api::{ApiConfig, ApiState, spawn_api_server},
    broker::{BrokerHandle, BrokerOptions},
    config::{StorageConfig, read_config_file},
    notify::Notifier,
    storage::{KvBackend, MemoryBackend},
};
use tracing::{info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("fleet_relay", LevelFilter::TRACE),
        ("fleet_hub", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)?;

    let backend: Arc<dyn KvBackend> = match config.storage.clone().unwrap_or_default() {
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => {
            Arc::new(fleet_relay::storage::SqliteBackend::new(path).await?)
        }
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => {
            warn!("built without storage-sqlite, falling back to in-memory storage");
            Arc::new(MemoryBackend::new())
        }
        StorageConfig::None => {
            warn!("no durable storage configured, snapshots will not survive restarts");
            Arc::new(MemoryBackend::new())
        }
    };

    let notifier = Notifier::new(config.notifier.clone());
    let broker = BrokerHandle::spawn(BrokerOptions::from(&config), backend, notifier);

    let api_config = ApiConfig {
        bind_addr: config.bind_addr,
        enable_cors: true,
    };
    spawn_api_server(api_config, ApiState::new(broker.clone())).await?;

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    broker.shutdown().await;

    Ok(())
}
