//! hv-protocol: Handshake wire format for hubvpn
//!
//! This crate defines the fixed-width binary payloads a node returns from its
//! session handshake endpoint, together with the JSON bodies exchanged with
//! that endpoint and with the local daemons.

pub mod error;
pub mod handshake;
pub mod message;
pub mod node_type;
pub mod session;

pub use error::HandshakeError;
pub use handshake::{
    Handshake, V2RayHandshake, WireGuardHandshake, V2RAY_HANDSHAKE_LEN, WIREGUARD_HANDSHAKE_LEN,
};
pub use message::{handshake_path, Envelope, EnvelopeError, HandshakeRequest};
pub use node_type::{NodeType, Transport};
pub use session::SessionId;
