//! SDN-IP daemon
//!
//! Loads the border interface and peer configuration, starts the route
//! pipeline and intent synchronizer, and runs until interrupted.

use anyhow::Context;
use clap::Parser;
use sdnipd::{
    HostTable, InterfaceDirectory, MemoryIntentStore, Router, RouterServices, SdnIpConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;

/// SDN-IP routing control plane
#[derive(Parser, Debug)]
#[command(name = "sdnipd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = sdnipd::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error) used when RUST_LOG is unset
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Claim leadership at startup (single-instance deployments)
    #[arg(long)]
    leader: bool,
}

fn init_logging(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    info!(config = %args.config.display(), "sdnipd: Starting SDN-IP control plane");

    let config = SdnIpConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    config.validate().context("invalid configuration")?;
    info!(
        app_id = %config.app_id,
        interfaces = config.interfaces.len(),
        bgp_peers = config.bgp_peers.len(),
        "sdnipd: Configuration loaded"
    );

    let directory = Arc::new(InterfaceDirectory::from_config(&config));
    let services = RouterServices {
        hosts: Arc::new(HostTable::new()),
        interfaces: directory.clone(),
        peers: directory,
        store: Arc::new(MemoryIntentStore::new()),
    };
    let router = Router::from_config(&config, services);

    if args.leader {
        router.leader_changed(true);
    }

    signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("sdnipd: Received shutdown signal");

    router.shutdown().await;
    Ok(())
}
