//! Handshake payload encoding/decoding
//!
//! A node answers a session handshake with a fixed-width payload whose layout
//! depends on the node type. There is no version field; the length alone
//! selects the layout, and anything else is rejected.
//!
//! WireGuard (58 bytes):
//! - interface IPv4: 4 bytes
//! - interface IPv6: 16 bytes
//! - endpoint IPv4: 4 bytes
//! - endpoint port: 2 bytes (u16, big-endian)
//! - peer public key: 32 bytes
//!
//! V2Ray relay (7 bytes):
//! - relay IPv4: 4 bytes
//! - relay port: 2 bytes (u16, big-endian)
//! - transport tag: 1 byte

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddrV4};

use bytes::{Buf, BufMut, BytesMut};

use crate::error::HandshakeError;
use crate::node_type::{NodeType, Transport};

/// Size of a WireGuard handshake payload in bytes
pub const WIREGUARD_HANDSHAKE_LEN: usize = 58;

/// Size of a relay handshake payload in bytes
pub const V2RAY_HANDSHAKE_LEN: usize = 7;

/// Connection parameters handed out by a WireGuard node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireGuardHandshake {
    /// Address assigned to the local interface (/32)
    pub ipv4: Ipv4Addr,
    /// Address assigned to the local interface (/128)
    pub ipv6: Ipv6Addr,
    /// Peer endpoint
    pub endpoint: SocketAddrV4,
    /// Peer public key
    pub peer_public_key: [u8; 32],
}

impl WireGuardHandshake {
    /// Encode the payload into a byte buffer
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(WIREGUARD_HANDSHAKE_LEN);
        dst.put_slice(&self.ipv4.octets());
        dst.put_slice(&self.ipv6.octets());
        dst.put_slice(&self.endpoint.ip().octets());
        dst.put_u16(self.endpoint.port());
        dst.put_slice(&self.peer_public_key);
    }

    /// Decode a payload, requiring exactly 58 bytes
    pub fn decode(mut src: &[u8]) -> Result<Self, HandshakeError> {
        if src.len() != WIREGUARD_HANDSHAKE_LEN {
            return Err(HandshakeError::InvalidLength {
                node_type: NodeType::WireGuard,
                expected: WIREGUARD_HANDSHAKE_LEN,
                actual: src.len(),
            });
        }

        let ipv4 = Ipv4Addr::from(src.get_u32());
        let ipv6 = Ipv6Addr::from(src.get_u128());
        let host = Ipv4Addr::from(src.get_u32());
        let port = src.get_u16();
        let mut peer_public_key = [0u8; 32];
        src.copy_to_slice(&mut peer_public_key);

        Ok(Self {
            ipv4,
            ipv6,
            endpoint: SocketAddrV4::new(host, port),
            peer_public_key,
        })
    }
}

/// Connection parameters handed out by a relay node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct V2RayHandshake {
    /// Relay address
    pub address: Ipv4Addr,
    /// Relay port
    pub port: u16,
    /// Stream transport
    pub transport: Transport,
}

impl V2RayHandshake {
    /// Encode the payload into a byte buffer
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(V2RAY_HANDSHAKE_LEN);
        dst.put_slice(&self.address.octets());
        dst.put_u16(self.port);
        dst.put_u8(self.transport.as_u8());
    }

    /// Decode a payload, requiring exactly 7 bytes
    pub fn decode(mut src: &[u8]) -> Result<Self, HandshakeError> {
        if src.len() != V2RAY_HANDSHAKE_LEN {
            return Err(HandshakeError::InvalidLength {
                node_type: NodeType::V2Ray,
                expected: V2RAY_HANDSHAKE_LEN,
                actual: src.len(),
            });
        }

        let address = Ipv4Addr::from(src.get_u32());
        let port = src.get_u16();
        let tag = src.get_u8();
        let transport = Transport::from_u8(tag).ok_or(HandshakeError::UnknownTransport(tag))?;

        Ok(Self {
            address,
            port,
            transport,
        })
    }
}

/// A decoded handshake for either node type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handshake {
    WireGuard(WireGuardHandshake),
    V2Ray(V2RayHandshake),
}

impl Handshake {
    /// Decode `src` using the layout for `node_type`
    pub fn decode(node_type: NodeType, src: &[u8]) -> Result<Self, HandshakeError> {
        match node_type {
            NodeType::WireGuard => WireGuardHandshake::decode(src).map(Self::WireGuard),
            NodeType::V2Ray => V2RayHandshake::decode(src).map(Self::V2Ray),
        }
    }

    /// Node type this handshake belongs to
    pub fn node_type(&self) -> NodeType {
        match self {
            Handshake::WireGuard(_) => NodeType::WireGuard,
            Handshake::V2Ray(_) => NodeType::V2Ray,
        }
    }

    /// Encode into a freshly allocated buffer
    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        match self {
            Handshake::WireGuard(h) => h.encode(&mut buf),
            Handshake::V2Ray(h) => h.encode(&mut buf),
        }
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_wireguard() -> WireGuardHandshake {
        WireGuardHandshake {
            ipv4: Ipv4Addr::new(10, 8, 0, 2),
            ipv6: "fd00::2".parse().unwrap(),
            endpoint: SocketAddrV4::new(Ipv4Addr::new(203, 0, 113, 5), 51820),
            peer_public_key: [0u8; 32],
        }
    }

    #[test]
    fn test_wireguard_roundtrip() {
        let handshake = scenario_wireguard();
        let mut buf = BytesMut::new();
        handshake.encode(&mut buf);
        assert_eq!(buf.len(), WIREGUARD_HANDSHAKE_LEN);

        let decoded = WireGuardHandshake::decode(&buf).unwrap();
        assert_eq!(decoded, handshake);
    }

    #[test]
    fn test_wireguard_layout_is_big_endian() {
        let mut raw = vec![10, 8, 0, 2];
        raw.extend_from_slice(&"fd00::2".parse::<Ipv6Addr>().unwrap().octets());
        raw.extend_from_slice(&[203, 0, 113, 5]);
        raw.extend_from_slice(&[0xCA, 0x6C]);
        raw.extend_from_slice(&[7u8; 32]);

        let decoded = WireGuardHandshake::decode(&raw).unwrap();
        assert_eq!(decoded.endpoint.to_string(), "203.0.113.5:51820");
        assert_eq!(decoded.ipv4, Ipv4Addr::new(10, 8, 0, 2));
        assert_eq!(decoded.ipv6.to_string(), "fd00::2");
        assert_eq!(decoded.peer_public_key, [7u8; 32]);
    }

    #[test]
    fn test_wireguard_wrong_length() {
        for len in [0, 57, 59, 7] {
            let raw = vec![0u8; len];
            let result = Handshake::decode(NodeType::WireGuard, &raw);
            assert_eq!(
                result,
                Err(HandshakeError::InvalidLength {
                    node_type: NodeType::WireGuard,
                    expected: WIREGUARD_HANDSHAKE_LEN,
                    actual: len,
                })
            );
        }
    }

    #[test]
    fn test_v2ray_websocket() {
        let raw = [203, 0, 113, 9, 0x20, 0xFB, 0x03];
        let decoded = V2RayHandshake::decode(&raw).unwrap();

        assert_eq!(decoded.address, Ipv4Addr::new(203, 0, 113, 9));
        assert_eq!(decoded.port, 8443);
        assert_eq!(decoded.transport, Transport::WebSocket);
        assert_eq!(decoded.transport.as_str(), "websocket");
    }

    #[test]
    fn test_v2ray_unknown_transport() {
        let raw = [127, 0, 0, 1, 0, 80, 0x09];
        assert!(matches!(
            V2RayHandshake::decode(&raw),
            Err(HandshakeError::UnknownTransport(0x09))
        ));
    }

    #[test]
    fn test_v2ray_wrong_length() {
        let raw = [0u8; 58];
        assert!(matches!(
            Handshake::decode(NodeType::V2Ray, &raw),
            Err(HandshakeError::InvalidLength { expected: 7, actual: 58, .. })
        ));
    }

    #[test]
    fn test_handshake_to_bytes() {
        let handshake = Handshake::WireGuard(scenario_wireguard());
        let bytes = handshake.to_bytes();
        assert_eq!(Handshake::decode(NodeType::WireGuard, &bytes).unwrap(), handshake);
        assert_eq!(handshake.node_type(), NodeType::WireGuard);
    }
}
