//! Handshake codec errors

use thiserror::Error;

use crate::node_type::NodeType;

/// Errors that can occur while decoding a node handshake
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// Payload length does not match the layout for the node type
    #[error("Malformed {node_type} handshake: expected {expected} bytes, got {actual}")]
    InvalidLength {
        node_type: NodeType,
        expected: usize,
        actual: usize,
    },

    /// Unknown relay transport tag
    #[error("Unknown transport tag: {0:#04x}")]
    UnknownTransport(u8),

    /// Unknown node type
    #[error("Unknown node type: {0}")]
    UnknownNodeType(u64),
}
