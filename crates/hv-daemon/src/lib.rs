//! hv-daemon: local service and keyring daemons for hubvpn
//!
//! The service daemon owns the connection lifecycle for one home directory:
//! it negotiates sessions on the ledger, performs the node handshake, drives
//! the local tunnel backend and persists the status record. The keyring
//! daemon stores account keys and signs on request. Both are exposed as
//! loopback HTTP services discovered through `url.txt`.

pub mod backend;
pub mod backoff;
pub mod gateway;
pub mod keyring;
pub mod ledger;
pub mod nodes;
pub mod orchestrator;
pub mod remote;
pub mod state;

pub use orchestrator::{ConnectionOrchestrator, Credentials};
pub use state::DaemonState;
