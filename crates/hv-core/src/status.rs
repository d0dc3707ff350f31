//! Persisted connection status
//!
//! The status file is the only record of which tunnel the daemon believes
//! is active across restarts. It is always reconciled against the backend's
//! own liveness check before being trusted.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use hv_protocol::NodeType;
use serde::{Deserialize, Serialize};

use crate::config::serde_utils::base64_bytes;
use crate::error::StatusError;
use crate::tunnel::TunnelConfig;

/// File name of the status record inside the home directory
pub const STATUS_FILENAME: &str = "status.json";

/// Backend recorded in the status file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum BackendKind {
    #[default]
    None,
    WireGuard,
    V2Ray,
}

impl BackendKind {
    pub fn node_type(&self) -> Option<NodeType> {
        match self {
            BackendKind::None => None,
            BackendKind::WireGuard => Some(NodeType::WireGuard),
            BackendKind::V2Ray => Some(NodeType::V2Ray),
        }
    }
}

impl From<u8> for BackendKind {
    fn from(value: u8) -> Self {
        match value {
            1 => BackendKind::WireGuard,
            2 => BackendKind::V2Ray,
            _ => BackendKind::None,
        }
    }
}

impl From<BackendKind> for u8 {
    fn from(value: BackendKind) -> Self {
        match value {
            BackendKind::None => 0,
            BackendKind::WireGuard => 1,
            BackendKind::V2Ray => 2,
        }
    }
}

impl From<NodeType> for BackendKind {
    fn from(value: NodeType) -> Self {
        match value {
            NodeType::WireGuard => BackendKind::WireGuard,
            NodeType::V2Ray => BackendKind::V2Ray,
        }
    }
}

/// The persisted connection record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Status {
    /// Ledger session id
    pub id: u64,
    /// Account that owns the session
    pub from: String,
    /// Node serving the session
    pub to: String,
    /// Backend type
    #[serde(rename = "type")]
    pub kind: BackendKind,
    /// Backend configuration blob
    #[serde(with = "base64_bytes")]
    pub info: Vec<u8>,
    /// Interface or handle name
    pub iface: String,
    /// Relay process, kept outside the blob so teardown never depends on it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

impl Status {
    /// Record for a freshly established tunnel
    pub fn connected(
        id: u64,
        from: impl Into<String>,
        to: impl Into<String>,
        config: &TunnelConfig,
    ) -> Result<Self, StatusError> {
        Ok(Self {
            id,
            from: from.into(),
            to: to.into(),
            kind: config.node_type().into(),
            info: config.to_blob()?,
            iface: config.handle().to_string(),
            pid: match config {
                TunnelConfig::V2Ray(c) => c.pid,
                TunnelConfig::WireGuard(_) => None,
            },
        })
    }

    /// Whether the record describes no tunnel at all
    pub fn is_empty(&self) -> bool {
        self.iface.is_empty() && self.kind == BackendKind::None
    }

    /// Decode the stored tunnel configuration, if any
    pub fn tunnel_config(&self) -> Result<Option<TunnelConfig>, StatusError> {
        match self.kind.node_type() {
            Some(node_type) if !self.info.is_empty() => {
                Ok(Some(TunnelConfig::from_blob(node_type, &self.info)?))
            }
            _ => Ok(None),
        }
    }
}

/// File-backed store for [`Status`]
#[derive(Debug, Clone)]
pub struct StatusStore {
    path: PathBuf,
}

impl StatusStore {
    /// Create a store at an explicit path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create a store in a home directory
    pub fn in_home(home: &Path) -> Self {
        Self::new(home.join(STATUS_FILENAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the status; a missing or empty file is the empty status
    pub fn load(&self) -> Result<Status, StatusError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Status::default()),
            Err(source) => {
                return Err(StatusError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Status::default());
        }

        serde_json::from_slice(&data).map_err(|source| StatusError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Atomically replace the status file
    pub fn save(&self, status: &Status) -> Result<(), StatusError> {
        let json = serde_json::to_vec_pretty(status)?;
        self.write_atomic(&json).map_err(|source| StatusError::Io {
            path: self.path.clone(),
            source,
        })?;
        tracing::debug!("Saved status for session {} to {:?}", status.id, self.path);
        Ok(())
    }

    /// Remove the status file; succeeds if it is already gone
    pub fn clear(&self) -> Result<(), StatusError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StatusError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn write_atomic(&self, contents: &[u8]) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        {
            let mut options = fs::OpenOptions::new();
            options.write(true).create(true).truncate(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(0o600);
            }
            let mut file = options.open(&tmp)?;
            file.write_all(contents)?;
            file.sync_all()?;
        }

        fs::rename(&tmp, &self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tunnel::{WireGuardConfig, WireGuardPeer};
    use tempfile::TempDir;

    fn tunnel() -> TunnelConfig {
        TunnelConfig::WireGuard(WireGuardConfig {
            name: "wg99".to_string(),
            private_key: String::new(),
            ipv4: "10.8.0.2".parse().unwrap(),
            ipv6: "fd00::2".parse().unwrap(),
            listen_port: 51000,
            dns: vec!["10.8.0.1".parse().unwrap()],
            peer: WireGuardPeer {
                public_key: "AAAA".to_string(),
                endpoint: "203.0.113.5:51820".parse().unwrap(),
                persistent_keepalive: 15,
            },
        })
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = StatusStore::in_home(dir.path());
        let status = store.load().unwrap();
        assert!(status.is_empty());
        assert_eq!(status, Status::default());
    }

    #[test]
    fn test_load_empty_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = StatusStore::in_home(dir.path());
        fs::write(store.path(), b"").unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = StatusStore::in_home(dir.path());
        let status = Status::connected(7, "sent1from", "sentnode1to", &tunnel()).unwrap();

        store.save(&status).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded, status);
        assert_eq!(loaded.kind, BackendKind::WireGuard);
        assert_eq!(loaded.iface, "wg99");
        assert!(matches!(
            loaded.tunnel_config().unwrap(),
            Some(TunnelConfig::WireGuard(_))
        ));

        // No temp file left behind
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from(STATUS_FILENAME)]);
    }

    #[test]
    fn test_json_field_names() {
        let status = Status::connected(7, "a", "b", &tunnel()).unwrap();
        let value: serde_json::Value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["type"], 1);
        assert_eq!(value["iface"], "wg99");
        assert!(value["info"].is_string());
        assert!(value.get("pid").is_none());
    }

    #[test]
    fn test_relay_pid_is_recorded() {
        let config = TunnelConfig::V2Ray(crate::tunnel::V2RayConfig::for_process(31337));
        let status = Status::connected(8, "a", "b", &config).unwrap();
        assert_eq!(status.pid, Some(31337));
        assert_eq!(status.iface, crate::tunnel::V2RAY_HANDLE);

        let value: serde_json::Value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["pid"], 31337);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = StatusStore::in_home(dir.path());
        store.save(&Status::default()).unwrap();
        store.clear().unwrap();
        store.clear().unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = StatusStore::in_home(dir.path());
        fs::write(store.path(), b"{not json").unwrap();
        assert!(matches!(store.load(), Err(StatusError::Corrupt { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_status_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = StatusStore::in_home(dir.path());
        store.save(&Status::default()).unwrap();
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
