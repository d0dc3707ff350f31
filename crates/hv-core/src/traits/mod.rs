//! Collaborator traits
//!
//! The orchestrator talks to the ledger and the key store only through these
//! traits, so tests can substitute in-memory implementations.

mod keyring;
mod ledger;

pub use keyring::{Keyring, KeyringAccess, NewKey};
pub use ledger::{
    sign_bytes, Ledger, Node, Session, SessionMsg, SignedTx, TxResponse, UnsignedTx,
};
