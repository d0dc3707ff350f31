//! Node technologies and relay transports
//!
//! Both enums have a stable numeric form on the wire: node types travel as
//! integers in node status documents, transports as a single tag byte at the
//! end of a relay handshake.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HandshakeError;

/// Tunnel technology a node serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
#[repr(u64)]
pub enum NodeType {
    /// WireGuard interface
    WireGuard = 1,
    /// V2Ray vmess relay exposed through a local SOCKS proxy
    V2Ray = 2,
}

impl NodeType {
    /// Convert to the wire value
    pub fn as_u64(&self) -> u64 {
        *self as u64
    }

    /// Convert from the wire value
    pub fn from_u64(value: u64) -> Option<Self> {
        match value {
            1 => Some(Self::WireGuard),
            2 => Some(Self::V2Ray),
            _ => None,
        }
    }
}

impl TryFrom<u64> for NodeType {
    type Error = HandshakeError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::from_u64(value).ok_or(HandshakeError::UnknownNodeType(value))
    }
}

impl From<NodeType> for u64 {
    fn from(value: NodeType) -> Self {
        value.as_u64()
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeType::WireGuard => write!(f, "wireguard"),
            NodeType::V2Ray => write!(f, "v2ray"),
        }
    }
}

/// Stream transport used by a relay node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Transport {
    #[serde(rename = "tcp")]
    Tcp = 0x01,
    #[serde(rename = "mkcp")]
    Mkcp = 0x02,
    #[serde(rename = "websocket")]
    WebSocket = 0x03,
    #[serde(rename = "http")]
    Http = 0x04,
    #[serde(rename = "domainsocket")]
    DomainSocket = 0x05,
    #[serde(rename = "quic")]
    Quic = 0x06,
    #[serde(rename = "gun")]
    Gun = 0x07,
    #[serde(rename = "grpc")]
    Grpc = 0x08,
}

impl Transport {
    /// All transports in tag order
    pub const ALL: [Transport; 8] = [
        Transport::Tcp,
        Transport::Mkcp,
        Transport::WebSocket,
        Transport::Http,
        Transport::DomainSocket,
        Transport::Quic,
        Transport::Gun,
        Transport::Grpc,
    ];

    /// Convert to the tag byte
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Convert from the tag byte
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_u8() == value)
    }

    /// Network name as understood by the relay configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Tcp => "tcp",
            Transport::Mkcp => "mkcp",
            Transport::WebSocket => "websocket",
            Transport::Http => "http",
            Transport::DomainSocket => "domainsocket",
            Transport::Quic => "quic",
            Transport::Gun => "gun",
            Transport::Grpc => "grpc",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown transport: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_tags_are_contiguous() {
        for (i, transport) in Transport::ALL.iter().enumerate() {
            assert_eq!(transport.as_u8() as usize, i + 1);
            assert_eq!(Transport::from_u8(transport.as_u8()), Some(*transport));
        }
        assert_eq!(Transport::from_u8(0x00), None);
        assert_eq!(Transport::from_u8(0x09), None);
    }

    #[test]
    fn test_transport_names() {
        assert_eq!(Transport::WebSocket.to_string(), "websocket");
        assert_eq!("grpc".parse::<Transport>().unwrap(), Transport::Grpc);
        assert!("ws".parse::<Transport>().is_err());
    }

    #[test]
    fn test_node_type_serde_as_number() {
        let json = serde_json::to_string(&NodeType::V2Ray).unwrap();
        assert_eq!(json, "2");

        let parsed: NodeType = serde_json::from_str("1").unwrap();
        assert_eq!(parsed, NodeType::WireGuard);

        assert!(serde_json::from_str::<NodeType>("7").is_err());
    }
}
