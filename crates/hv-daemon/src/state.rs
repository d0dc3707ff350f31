//! Shared daemon state

use std::sync::Arc;

use hv_core::config::DaemonConfig;
use hv_core::traits::{Keyring, Ledger};
use hv_core::ClientError;

use crate::backend::{CommandRunner, SystemRunner};
use crate::keyring::FileKeyring;
use crate::ledger::RestLedger;
use crate::orchestrator::ConnectionOrchestrator;

/// Everything the gateways need
pub struct DaemonState {
    /// Configuration
    pub config: DaemonConfig,
    /// Connection lifecycle
    pub orchestrator: Arc<ConnectionOrchestrator>,
    /// Key store
    pub keyring: Arc<dyn Keyring>,
}

impl DaemonState {
    /// Build state with the production collaborators
    pub fn new(config: DaemonConfig) -> Result<Self, ClientError> {
        let ledger: Arc<dyn Ledger> = Arc::new(RestLedger::new(&config.ledger)?);
        let keyring: Arc<dyn Keyring> = Arc::new(FileKeyring::new(config.keyring.home.clone()));
        Self::with_collaborators(config, ledger, keyring, Arc::new(SystemRunner))
    }

    /// Build state around caller-supplied collaborators
    pub fn with_collaborators(
        config: DaemonConfig,
        ledger: Arc<dyn Ledger>,
        keyring: Arc<dyn Keyring>,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self, ClientError> {
        let orchestrator = ConnectionOrchestrator::new(
            config.clone(),
            ledger,
            Arc::clone(&keyring),
            runner,
        )?;

        Ok(Self {
            config,
            orchestrator: Arc::new(orchestrator),
            keyring,
        })
    }
}
