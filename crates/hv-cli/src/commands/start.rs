//! Foreground daemon command

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::output::print_info;
use hv_core::config::DaemonConfig;
use hv_daemon::gateway::{self, RunOptions};
use hv_daemon::DaemonState;

/// Run the gateways until Ctrl-C or SIGTERM
pub async fn start_command(config: DaemonConfig, options: RunOptions) -> Result<()> {
    tracing::info!("hubvpn daemon starting for {:?}", config.home);

    let home = config.home.clone();
    let state = DaemonState::new(config).context("Failed to initialise daemon")?;

    let cancel = CancellationToken::new();
    tokio::spawn(gateway::shutdown_on_signal(cancel.clone()));

    print_info(&format!("Serving {:?}, press Ctrl-C to stop", home));
    gateway::run(&state, options, cancel).await?;

    tracing::info!("Daemon shutdown complete");
    Ok(())
}
