//! Local HTTP gateways
//!
//! Two independent services share one process: the service gateway drives
//! the [`ConnectionOrchestrator`](crate::orchestrator::ConnectionOrchestrator)
//! and the keyring gateway fronts the key store. Each binds its own port and
//! publishes its own `url.txt`. All routes are `POST` with a JSON body and
//! answer with the uniform envelope.

pub mod keyring;
pub mod response;
pub mod server;
pub mod service;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

pub use response::{ApiError, ApiJson, ApiResult};
pub use server::{app, Gateway};

use crate::state::DaemonState;

/// Which gateways to run and where
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub service: bool,
    pub keyring: bool,
    /// Service gateway address, overriding the config
    pub listen_on: Option<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            service: true,
            keyring: true,
            listen_on: None,
        }
    }
}

/// Serve the selected gateways until `cancel` fires
pub async fn run(state: &DaemonState, options: RunOptions, cancel: CancellationToken) -> Result<()> {
    if !options.service && !options.keyring {
        anyhow::bail!("Nothing to run: both gateways are disabled");
    }

    let mut tasks = tokio::task::JoinSet::new();

    if options.service {
        let address = options
            .listen_on
            .clone()
            .unwrap_or_else(|| state.config.listen_on.clone());
        let gateway = Gateway::bind(
            "service",
            &address,
            &state.config.home,
            service::router(state.orchestrator.clone()),
        )
        .await?;
        tasks.spawn(gateway.run(cancel.clone()));
    }

    if options.keyring {
        let gateway = Gateway::bind(
            "keyring",
            &state.config.keyring.listen_on,
            &state.config.keyring.home,
            keyring::router(state.keyring.clone()),
        )
        .await?;
        tasks.spawn(gateway.run(cancel.clone()));
    }

    // One gateway failing takes the other down with it
    let mut result = Ok(());
    while let Some(joined) = tasks.join_next().await {
        let outcome = joined.map_err(anyhow::Error::from).and_then(|r| r);
        if let Err(e) = outcome {
            tracing::error!("{:#}", e);
            cancel.cancel();
            if result.is_ok() {
                result = Err(e);
            }
        }
    }
    result
}

/// Cancel `cancel` on Ctrl-C or SIGTERM
pub async fn shutdown_on_signal(cancel: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown...");
        }
    }

    cancel.cancel();
}
