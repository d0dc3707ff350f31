//! Daemon configuration

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::serde_utils::{duration_millis, duration_secs};
use crate::error::ConfigError;
use crate::types::KeyringBackend;

/// Configuration shared by the service and keyring daemons
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Home directory holding status, tunnel configs and `url.txt`
    #[serde(skip)]
    pub home: PathBuf,

    /// Address the service daemon binds to (port 0 lets the OS choose)
    pub listen_on: String,

    /// Keyring daemon settings
    pub keyring: KeyringConfig,

    /// Ledger client settings
    pub ledger: LedgerConfig,

    /// Node handshake settings
    pub handshake: HandshakeConfig,

    /// Local tunnel settings
    pub tunnel: TunnelSettings,

    /// Node listing settings
    pub nodes: NodesConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            home: super::default_home_dir(),
            listen_on: "127.0.0.1:9090".to_string(),
            keyring: KeyringConfig::default(),
            ledger: LedgerConfig::default(),
            handshake: HandshakeConfig::default(),
            tunnel: TunnelSettings::default(),
            nodes: NodesConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Anchor relative locations to `home`
    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = home.into();
        if self.keyring.home.as_os_str().is_empty() {
            self.keyring.home = self.home.join("keyring");
        }
        self
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_on.is_empty() {
            return Err(ConfigError::Invalid("listen_on cannot be empty".to_string()));
        }
        self.listen_on.parse::<SocketAddr>().map_err(|e| {
            ConfigError::Invalid(format!("listen_on {}: {}", self.listen_on, e))
        })?;
        self.keyring.listen_on.parse::<SocketAddr>().map_err(|e| {
            ConfigError::Invalid(format!("keyring.listen_on {}: {}", self.keyring.listen_on, e))
        })?;
        if self.nodes.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "nodes.concurrency must be at least 1".to_string(),
            ));
        }
        if self.ledger.poll_attempts == 0 {
            return Err(ConfigError::Invalid(
                "ledger.poll_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Path of the persisted connection status
    pub fn status_path(&self) -> PathBuf {
        self.home.join(crate::status::STATUS_FILENAME)
    }
}

/// Keyring daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyringConfig {
    /// Address the keyring daemon binds to
    pub listen_on: String,

    /// Backend used when a request does not name one
    pub backend: KeyringBackend,

    /// Keyring home; empty means `<home>/keyring`
    pub home: PathBuf,
}

impl Default for KeyringConfig {
    fn default() -> Self {
        Self {
            listen_on: "127.0.0.1:9091".to_string(),
            backend: KeyringBackend::Os,
            home: PathBuf::new(),
        }
    }
}

/// Ledger client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// REST endpoint of the ledger gateway
    pub rpc_address: String,

    /// Chain identifier included in signed transactions
    pub chain_id: String,

    /// Gas limit
    pub gas: u64,

    /// Fees, e.g. "10000udvpn"
    pub fees: String,

    /// Transaction memo
    pub memo: String,

    /// Request timeout
    #[serde(with = "duration_secs")]
    pub timeout: Duration,

    /// How many times to look for a freshly started session
    pub poll_attempts: u32,

    /// Initial delay between session lookups, in milliseconds
    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_address: "https://rpc.sentinel.co:443".to_string(),
            chain_id: "sentinelhub-2".to_string(),
            gas: 200_000,
            fees: String::new(),
            memo: String::new(),
            timeout: Duration::from_secs(30),
            poll_attempts: 10,
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Node handshake configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// Request timeout
    #[serde(with = "duration_secs")]
    pub timeout: Duration,

    /// Skip TLS certificate validation for node endpoints. Nodes commonly
    /// serve self-signed certificates; the session signature authenticates
    /// the exchange.
    pub accept_invalid_certs: bool,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            accept_invalid_certs: true,
        }
    }
}

/// Local tunnel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelSettings {
    /// WireGuard interface name
    pub wireguard_interface: String,

    /// Resolver placed ahead of any user-supplied resolvers
    pub default_resolver: IpAddr,

    /// WireGuard persistent keepalive in seconds
    pub keepalive: u16,
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            wireguard_interface: "wg99".to_string(),
            default_resolver: IpAddr::V4(Ipv4Addr::new(10, 8, 0, 1)),
            keepalive: 15,
        }
    }
}

/// Node listing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodesConfig {
    /// Maximum concurrent node status requests
    pub concurrency: usize,

    /// Per-node request timeout
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl Default for NodesConfig {
    fn default() -> Self {
        Self {
            concurrency: 16,
            timeout: Duration::from_secs(5),
        }
    }
}
