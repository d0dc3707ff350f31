//! Key management collaborator

use crate::error::KeyringError;
use crate::ipc::{KeyInfo, SignResponse};
use crate::types::KeyringBackend;

/// Backend and password used to open the keyring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyringAccess {
    pub backend: KeyringBackend,
    pub password: String,
}

impl KeyringAccess {
    pub fn new(backend: KeyringBackend, password: impl Into<String>) -> Self {
        Self {
            backend,
            password: password.into(),
        }
    }
}

/// Parameters for importing a key from a mnemonic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewKey {
    pub name: String,
    pub mnemonic: String,
    pub bip39_password: String,
    pub coin_type: u32,
    pub account: u32,
    pub index: u32,
}

/// Local key store
///
/// Implementations are synchronous; async callers run them on a blocking
/// thread.
pub trait Keyring: Send + Sync {
    /// Import a key, failing if the name is taken
    fn add(&self, access: &KeyringAccess, key: NewKey) -> Result<KeyInfo, KeyringError>;

    /// Look up one key
    fn get(&self, access: &KeyringAccess, name: &str) -> Result<KeyInfo, KeyringError>;

    /// All keys, sorted by name
    fn list(&self, access: &KeyringAccess) -> Result<Vec<KeyInfo>, KeyringError>;

    /// Remove a key
    fn delete(&self, access: &KeyringAccess, name: &str) -> Result<(), KeyringError>;

    /// Sign arbitrary bytes with a key
    fn sign(
        &self,
        access: &KeyringAccess,
        name: &str,
        bytes: &[u8],
    ) -> Result<SignResponse, KeyringError>;
}
