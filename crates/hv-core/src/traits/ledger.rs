//! Ledger collaborator

use async_trait::async_trait;
use hv_protocol::{NodeType, SessionId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::LedgerError;
use crate::types::{AccAddress, NodeAddress};

/// An active ledger session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    /// Subscription or plan the session draws from
    #[serde(default)]
    pub subscription: u64,
    /// Node serving the session
    pub node: NodeAddress,
    /// Account that owns the session
    pub address: AccAddress,
    #[serde(default)]
    pub status: String,
}

/// Ledger metadata for a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub address: NodeAddress,
    /// Base URL of the node's handshake API
    pub remote_url: String,
    #[serde(default)]
    pub status: String,
    /// Declared tunnel technology, when the ledger records it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<NodeType>,
}

/// Session messages the client broadcasts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionMsg {
    /// Start a session on `node` drawing from subscription `id`
    Start {
        from: AccAddress,
        id: u64,
        node: NodeAddress,
    },
    /// End session `id`, optionally rating it
    End {
        from: AccAddress,
        id: SessionId,
        rating: u64,
    },
}

/// Transaction body before signing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTx {
    pub chain_id: String,
    pub messages: Vec<SessionMsg>,
    #[serde(default)]
    pub memo: String,
    pub gas: u64,
    #[serde(default)]
    pub fees: String,
}

/// Bytes the account signs for a transaction
///
/// SHA-256 of the canonical JSON `{chain_id, messages, memo}`. serde_json
/// writes struct fields in declaration order, which keeps this stable.
pub fn sign_bytes(tx: &UnsignedTx) -> Result<Vec<u8>, serde_json::Error> {
    #[derive(Serialize)]
    struct Canonical<'a> {
        chain_id: &'a str,
        messages: &'a [SessionMsg],
        memo: &'a str,
    }

    let json = serde_json::to_vec(&Canonical {
        chain_id: &tx.chain_id,
        messages: &tx.messages,
        memo: &tx.memo,
    })?;
    Ok(Sha256::digest(&json).to_vec())
}

/// A transaction ready for broadcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTx {
    #[serde(flatten)]
    pub body: UnsignedTx,
    /// Base64 signer public key
    pub public_key: String,
    /// Base64 signature over [`sign_bytes`]
    pub signature: String,
}

/// Broadcast outcome
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResponse {
    pub txhash: String,
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub raw_log: String,
}

/// Read/write access to the ledger
#[async_trait]
pub trait Ledger: Send + Sync {
    /// The account's active session, if any
    async fn account_session(&self, account: &AccAddress) -> Result<Option<Session>, LedgerError>;

    /// Metadata for one node
    async fn node(&self, address: &NodeAddress) -> Result<Node, LedgerError>;

    /// Nodes with the given status, at most `limit`
    async fn nodes(&self, status: &str, limit: u32) -> Result<Vec<Node>, LedgerError>;

    /// Broadcast a signed transaction
    ///
    /// A response with a non-zero code is returned as `LedgerError::Broadcast`.
    async fn broadcast(&self, tx: SignedTx) -> Result<TxResponse, LedgerError>;
}
