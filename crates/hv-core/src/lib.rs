//! hv-core: shared types, configuration and persistence for hubvpn
//!
//! This crate holds what both the daemon and the CLI need: the error
//! taxonomy, the status store, tunnel configuration data, the local RPC
//! bodies, daemon discovery, and the ledger/keyring collaborator traits.

pub mod config;
pub mod discovery;
pub mod error;
pub mod ipc;
pub mod pidfile;
pub mod status;
pub mod traits;
pub mod tunnel;
pub mod types;
pub mod units;

pub use error::{
    BackendError, ClientError, ConfigError, KeyringError, LedgerError, RemoteError, StatusError,
    ValidationError,
};
pub use status::{BackendKind, Status, StatusStore};
pub use tunnel::{TunnelConfig, V2RayConfig, WireGuardConfig, WireGuardPeer};
pub use types::{AccAddress, KeyringBackend, NodeAddress};
