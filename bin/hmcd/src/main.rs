//! ---
//! hmc_section: "01-backend-daemon"
//! hmc_subsection: "binary"
//! hmc_type: "source"
//! hmc_scope: "code"
//! hmc_description: "Binary entrypoint for the HMC backend daemon."
//! hmc_version: "v0.1.0-alpha"
//! hmc_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hmc_config::BackendConfig;
use hmc_msg::{Message, MessageBus, MessageKind, MessageScheduler};
use hmc_net::ConnectionServer;

mod components;

use components::{ConfigurationWatcher, MediaCacheManager};

#[derive(Debug, Parser)]
#[command(author, version, about = "HMC backend daemon", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Override the connection server port")]
    port: Option<u16>,

    #[arg(long, default_value = "info", help = "Tracing filter directive")]
    log_filter: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cli.log_filter))
        .init();

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/hmc-backend.toml"));

    let mut config = BackendConfig::load(&candidates)?;
    if let Some(port) = cli.port {
        config.network.port = port;
    }
    config.validate()?;

    // One bus per backend process, passed by handle to every component.
    let bus = Arc::new(MessageBus::new());

    // Registration order mirrors dispatch expectations: the configuration
    // watcher must see content updates before the cache manager does.
    let watcher = Arc::new(ConfigurationWatcher::new());
    bus.register(watcher, &ConfigurationWatcher::subscriptions());
    let cache_manager = Arc::new(MediaCacheManager::new());
    bus.register(cache_manager, &MediaCacheManager::subscriptions());

    // Bind failure is fatal: without the bridge the backend is useless.
    let server = ConnectionServer::bind(config.network.listen_addr()?, Arc::clone(&bus)).await?;
    tokio::spawn(server.serve());

    let scheduler = MessageScheduler::new(Arc::clone(&bus));
    let interval = Duration::from_secs(config.cache.rebuild_interval_secs);
    for kind in [
        MessageKind::RebuildImageCache,
        MessageKind::RebuildMusicCache,
        MessageKind::RebuildVideoCache,
    ] {
        scheduler.add_message(Arc::new(Message::new(kind)), interval);
    }
    info!(
        scheduled = scheduler.len(),
        interval_secs = config.cache.rebuild_interval_secs,
        "cache maintenance scheduled"
    );

    info!("backend running; waiting for termination signal");
    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");

    Ok(())
}
