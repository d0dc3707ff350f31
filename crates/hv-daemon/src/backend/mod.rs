//! Tunnel backends
//!
//! A [`TunnelBackend`] drives one OS-level tunnel through its lifecycle:
//!
//! ```text
//! PreUp -> Up -> PostUp        (connect)
//! PreDown -> Down -> PostDown  (disconnect)
//! ```
//!
//! Only two technologies exist, so the concrete backends are gathered in the
//! closed [`Tunnel`] enum. Platform differences are chosen once through
//! [`Platform`] and never leak out of this module.

mod runner;
pub mod v2ray;
pub mod wireguard;

use std::fs;
use std::io;
use std::net::{Ipv4Addr, TcpListener, UdpSocket};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use hv_core::{BackendError, TunnelConfig};
use hv_protocol::NodeType;

pub use runner::{CommandOutput, CommandRunner, SystemRunner};
pub use v2ray::V2Ray;
pub use wireguard::WireGuard;

/// Operating system family a backend targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
}

impl Platform {
    /// Platform this binary was built for
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }
}

/// Lifecycle of one local tunnel
#[async_trait]
pub trait TunnelBackend: Send + Sync {
    /// Interface or handle name recorded in the status file
    fn handle(&self) -> &str;

    /// Render the backend's native configuration
    fn generate_config(&self) -> Result<Vec<u8>, BackendError>;

    /// Configuration to persist once the tunnel is up
    fn tunnel_config(&self) -> TunnelConfig;

    /// Write the native configuration to disk
    async fn pre_up(&self) -> Result<(), BackendError>;

    /// Bring the tunnel up
    async fn up(&mut self) -> Result<(), BackendError>;

    async fn post_up(&self) -> Result<(), BackendError> {
        Ok(())
    }

    /// Ground-truth liveness; never fails, only reports false
    async fn is_up(&self) -> bool;

    async fn pre_down(&self) -> Result<(), BackendError> {
        Ok(())
    }

    /// Tear the tunnel down; an absent tunnel is a success
    async fn down(&self) -> Result<(), BackendError>;

    /// Remove the native configuration
    async fn post_down(&self) -> Result<(), BackendError>;

    /// Bytes (uploaded, downloaded); (0, 0) when counters are unavailable
    async fn transfer(&self) -> (u64, u64);
}

/// One of the two supported tunnel technologies
pub enum Tunnel {
    WireGuard(WireGuard),
    V2Ray(V2Ray),
}

impl Tunnel {
    /// Build the backend for a configuration
    pub fn new(
        config: TunnelConfig,
        home: &Path,
        platform: Platform,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        match config {
            TunnelConfig::WireGuard(config) => {
                Tunnel::WireGuard(WireGuard::new(config, home, platform, runner))
            }
            TunnelConfig::V2Ray(config) => Tunnel::V2Ray(V2Ray::new(config, home, platform, runner)),
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            Tunnel::WireGuard(_) => NodeType::WireGuard,
            Tunnel::V2Ray(_) => NodeType::V2Ray,
        }
    }

    fn inner(&self) -> &dyn TunnelBackend {
        match self {
            Tunnel::WireGuard(t) => t,
            Tunnel::V2Ray(t) => t,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn TunnelBackend {
        match self {
            Tunnel::WireGuard(t) => t,
            Tunnel::V2Ray(t) => t,
        }
    }

    /// Run PreDown, Down and PostDown in order
    pub async fn deactivate(&self) -> Result<(), BackendError> {
        self.pre_down().await?;
        self.down().await?;
        self.post_down().await
    }
}

#[async_trait]
impl TunnelBackend for Tunnel {
    fn handle(&self) -> &str {
        self.inner().handle()
    }

    fn generate_config(&self) -> Result<Vec<u8>, BackendError> {
        self.inner().generate_config()
    }

    fn tunnel_config(&self) -> TunnelConfig {
        self.inner().tunnel_config()
    }

    async fn pre_up(&self) -> Result<(), BackendError> {
        self.inner().pre_up().await
    }

    async fn up(&mut self) -> Result<(), BackendError> {
        self.inner_mut().up().await
    }

    async fn post_up(&self) -> Result<(), BackendError> {
        self.inner().post_up().await
    }

    async fn is_up(&self) -> bool {
        self.inner().is_up().await
    }

    async fn pre_down(&self) -> Result<(), BackendError> {
        self.inner().pre_down().await
    }

    async fn down(&self) -> Result<(), BackendError> {
        self.inner().down().await
    }

    async fn post_down(&self) -> Result<(), BackendError> {
        self.inner().post_down().await
    }

    async fn transfer(&self) -> (u64, u64) {
        self.inner().transfer().await
    }
}

/// A free UDP port on all interfaces
pub fn free_udp_port() -> Result<u16, BackendError> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).map_err(BackendError::Port)?;
    Ok(socket.local_addr().map_err(BackendError::Port)?.port())
}

/// A free TCP port on loopback
pub fn free_tcp_port() -> Result<u16, BackendError> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).map_err(BackendError::Port)?;
    Ok(listener.local_addr().map_err(BackendError::Port)?.port())
}

/// Write a file readable only by its owner
pub(crate) fn write_private(path: &Path, contents: &[u8]) -> Result<(), BackendError> {
    let result = (|| -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path)?;
        io::Write::write_all(&mut file, contents)?;
        file.sync_all()
    })();

    result.map_err(|source| BackendError::Config {
        path: path.to_path_buf(),
        source,
    })
}

/// Remove a file; a missing file is fine
pub(crate) fn remove_if_exists(path: &Path) -> Result<(), BackendError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(BackendError::Config {
            path: path.to_path_buf(),
            source,
        }),
    }
}

pub(crate) fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub(crate) fn home_tool(home: &Path, dir: &str, exe: &str) -> PathBuf {
    home.join(dir).join(exe)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_ports() {
        assert_ne!(free_udp_port().unwrap(), 0);
        assert_ne!(free_tcp_port().unwrap(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_write_private_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("wg99.conf");
        write_private(&path, b"x").unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        remove_if_exists(&path).unwrap();
        remove_if_exists(&path).unwrap();
    }
}
