//! Tunnel configuration data
//!
//! A [`TunnelConfig`] is built once per connect from the decoded node
//! handshake plus locally generated identity, and is stored (without
//! secrets) in the status record so a later disconnect can find the tunnel
//! again.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddrV4};

use hv_protocol::{NodeType, Transport};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Catch-all routes installed for the WireGuard peer
pub const ALLOWED_IPS: [&str; 2] = ["0.0.0.0/0", "::/0"];

/// Handle name recorded for relay tunnels
pub const V2RAY_HANDLE: &str = "v2ray";

/// WireGuard interface configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireGuardConfig {
    /// Interface name
    pub name: String,
    /// Base64 local private key; never persisted
    #[serde(default, skip_serializing)]
    pub private_key: String,
    /// Interface address (/32)
    pub ipv4: Ipv4Addr,
    /// Interface address (/128)
    pub ipv6: Ipv6Addr,
    /// Local UDP listen port
    pub listen_port: u16,
    /// DNS resolvers
    pub dns: Vec<IpAddr>,
    /// The single remote peer
    pub peer: WireGuardPeer,
}

/// Remote WireGuard peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireGuardPeer {
    /// Base64 peer public key
    pub public_key: String,
    /// Peer endpoint
    pub endpoint: SocketAddrV4,
    /// Keepalive interval in seconds
    pub persistent_keepalive: u16,
}

impl WireGuardConfig {
    /// Minimal descriptor able to probe and tear down an existing interface
    pub fn for_interface(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            private_key: String::new(),
            ipv4: Ipv4Addr::UNSPECIFIED,
            ipv6: Ipv6Addr::UNSPECIFIED,
            listen_port: 0,
            dns: Vec::new(),
            peer: WireGuardPeer {
                public_key: String::new(),
                endpoint: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0),
                persistent_keepalive: 0,
            },
        }
    }

    /// Interface addresses in CIDR notation
    pub fn addresses(&self) -> [String; 2] {
        [format!("{}/32", self.ipv4), format!("{}/128", self.ipv6)]
    }
}

/// V2Ray relay configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct V2RayConfig {
    /// Local stats API port
    pub api_port: u16,
    /// Local SOCKS proxy port
    pub proxy_port: u16,
    /// Relay address
    pub address: Ipv4Addr,
    /// Relay port
    pub port: u16,
    /// Per-connection vmess user id
    pub id: Uuid,
    /// Stream transport
    pub transport: Transport,
    /// PID of the running relay process, once started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

impl V2RayConfig {
    /// Minimal descriptor able to probe and stop a running relay
    pub fn for_process(pid: u32) -> Self {
        Self {
            api_port: 0,
            proxy_port: 0,
            address: Ipv4Addr::UNSPECIFIED,
            port: 0,
            id: Uuid::nil(),
            transport: Transport::Tcp,
            pid: Some(pid),
        }
    }
}

/// Backend-specific tunnel configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelConfig {
    WireGuard(WireGuardConfig),
    V2Ray(V2RayConfig),
}

impl TunnelConfig {
    /// Node type matching this variant
    pub fn node_type(&self) -> NodeType {
        match self {
            TunnelConfig::WireGuard(_) => NodeType::WireGuard,
            TunnelConfig::V2Ray(_) => NodeType::V2Ray,
        }
    }

    /// Interface or handle name recorded in the status file
    pub fn handle(&self) -> &str {
        match self {
            TunnelConfig::WireGuard(c) => &c.name,
            TunnelConfig::V2Ray(_) => V2RAY_HANDLE,
        }
    }

    /// Encode the persisted form
    pub fn to_blob(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            TunnelConfig::WireGuard(c) => serde_json::to_vec(c),
            TunnelConfig::V2Ray(c) => serde_json::to_vec(c),
        }
    }

    /// Decode a persisted blob written for `node_type`
    pub fn from_blob(node_type: NodeType, blob: &[u8]) -> Result<Self, serde_json::Error> {
        match node_type {
            NodeType::WireGuard => serde_json::from_slice(blob).map(TunnelConfig::WireGuard),
            NodeType::V2Ray => serde_json::from_slice(blob).map(TunnelConfig::V2Ray),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wireguard() -> WireGuardConfig {
        WireGuardConfig {
            name: "wg99".to_string(),
            private_key: "c2VjcmV0".to_string(),
            ipv4: Ipv4Addr::new(10, 8, 0, 2),
            ipv6: "fd00::2".parse().unwrap(),
            listen_port: 51000,
            dns: vec![IpAddr::V4(Ipv4Addr::new(10, 8, 0, 1))],
            peer: WireGuardPeer {
                public_key: "AAAA".to_string(),
                endpoint: "203.0.113.5:51820".parse().unwrap(),
                persistent_keepalive: 15,
            },
        }
    }

    #[test]
    fn test_addresses() {
        assert_eq!(wireguard().addresses(), ["10.8.0.2/32", "fd00::2/128"]);
    }

    #[test]
    fn test_for_interface() {
        let config = WireGuardConfig::for_interface("wg7");
        assert_eq!(config.name, "wg7");
        assert!(config.private_key.is_empty());
    }

    #[test]
    fn test_private_key_is_not_persisted() {
        let config = TunnelConfig::WireGuard(wireguard());
        let blob = config.to_blob().unwrap();
        assert!(!String::from_utf8_lossy(&blob).contains("c2VjcmV0"));

        let restored = TunnelConfig::from_blob(NodeType::WireGuard, &blob).unwrap();
        match restored {
            TunnelConfig::WireGuard(c) => {
                assert!(c.private_key.is_empty());
                assert_eq!(c.name, "wg99");
            }
            other => panic!("unexpected variant {:?}", other),
        }
    }

    #[test]
    fn test_v2ray_blob_keeps_pid() {
        let config = TunnelConfig::V2Ray(V2RayConfig {
            api_port: 10001,
            proxy_port: 1080,
            address: Ipv4Addr::new(203, 0, 113, 9),
            port: 8443,
            id: Uuid::nil(),
            transport: Transport::Grpc,
            pid: Some(4242),
        });
        let blob = config.to_blob().unwrap();
        let restored = TunnelConfig::from_blob(NodeType::V2Ray, &blob).unwrap();
        assert_eq!(restored, config);
        assert_eq!(restored.handle(), "v2ray");
    }
}
