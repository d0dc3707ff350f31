//! hubvpn daemon
//!
//! Runs the service and keyring gateways for one home directory.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hv_core::config::{self, HOME_ENV};
use hv_daemon::gateway::{self, RunOptions};
use hv_daemon::DaemonState;

#[derive(Parser)]
#[command(name = "hv-daemon")]
#[command(about = "hubvpn service and keyring daemons")]
#[command(version)]
struct Args {
    /// Home directory
    #[arg(long, env = HOME_ENV)]
    home: Option<PathBuf>,

    /// Service gateway address (overrides config)
    #[arg(long)]
    listen_on: Option<String>,

    /// Do not run the service gateway
    #[arg(long)]
    no_service: bool,

    /// Do not run the keyring gateway
    #[arg(long)]
    no_keyring: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let home = args.home.unwrap_or_else(config::default_home_dir);
    let config = config::load_or_default(&home)
        .with_context(|| format!("Failed to load config from {:?}", home))?;
    tracing::info!("hubvpn daemon starting for {:?}", config.home);

    let state = DaemonState::new(config).context("Failed to initialise daemon")?;

    let cancel = CancellationToken::new();
    tokio::spawn(gateway::shutdown_on_signal(cancel.clone()));

    let options = RunOptions {
        service: !args.no_service,
        keyring: !args.no_keyring,
        listen_on: args.listen_on,
    };
    gateway::run(&state, options, cancel).await?;

    tracing::info!("Daemon shutdown complete");
    Ok(())
}
