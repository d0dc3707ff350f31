//! Configuration management for hubvpn

mod daemon;
pub mod serde_utils;

pub use daemon::{
    DaemonConfig, HandshakeConfig, KeyringConfig, LedgerConfig, NodesConfig, TunnelSettings,
};

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Environment variable overriding the home directory
pub const HOME_ENV: &str = "HUBVPN_HOME";

/// Get the default home directory (`~/.hubvpn`)
pub fn default_home_dir() -> PathBuf {
    if let Some(home) = std::env::var_os(HOME_ENV) {
        return PathBuf::from(home);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".hubvpn")
}

/// Get the configuration file path inside a home directory
pub fn config_path(home: &Path) -> PathBuf {
    home.join("config.toml")
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Load the daemon configuration for `home`, falling back to defaults
/// when no config file exists
pub fn load_or_default(home: &Path) -> Result<DaemonConfig, ConfigError> {
    let path = config_path(home);
    let config = match load_config::<DaemonConfig>(&path) {
        Ok(config) => config,
        Err(ConfigError::NotFound(_)) => {
            tracing::debug!("No config at {:?}, using defaults", path);
            DaemonConfig::default()
        }
        Err(e) => return Err(e),
    };
    config.validate()?;
    Ok(config.with_home(home))
}

/// Save configuration to a file
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write config: {}", e)))?;

    Ok(())
}
