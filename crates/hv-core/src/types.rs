//! Core domain types

use std::fmt;
use std::str::FromStr;

use bech32::{Bech32, Hrp};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Human-readable prefix of account addresses
pub const ACCOUNT_PREFIX: &str = "sent";

/// Human-readable prefix of node addresses
pub const NODE_PREFIX: &str = "sentnode";

/// Minimum password length for the encrypted keyring backend
pub const MIN_PASSWORD_LEN: usize = 8;

fn decode_with_prefix(s: &str, prefix: &str) -> Result<Vec<u8>, ValidationError> {
    let (hrp, data) = bech32::decode(s)
        .map_err(|e| ValidationError::new(format!("invalid bech32 address {}: {}", s, e)))?;
    if hrp.as_str() != prefix {
        return Err(ValidationError::new(format!(
            "invalid address prefix {}; expected {}",
            hrp.as_str(),
            prefix
        )));
    }
    if data.is_empty() {
        return Err(ValidationError::new(format!("empty address {}", s)));
    }
    Ok(data)
}

fn encode_with_prefix(prefix: &str, data: &[u8]) -> String {
    // Both prefixes are static and valid, and payloads are at most 32 bytes.
    Hrp::parse(prefix)
        .ok()
        .and_then(|hrp| bech32::encode::<Bech32>(hrp, data).ok())
        .unwrap_or_default()
}

/// Bech32 account address (`sent1...`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccAddress(String);

impl AccAddress {
    /// Build an address from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(encode_with_prefix(ACCOUNT_PREFIX, bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for AccAddress {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_with_prefix(s, ACCOUNT_PREFIX)?;
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for AccAddress {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AccAddress> for String {
    fn from(value: AccAddress) -> Self {
        value.0
    }
}

impl fmt::Display for AccAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bech32 node address (`sentnode1...`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeAddress(String);

impl NodeAddress {
    /// Build an address from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(encode_with_prefix(NODE_PREFIX, bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for NodeAddress {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_with_prefix(s, NODE_PREFIX)?;
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for NodeAddress {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NodeAddress> for String {
    fn from(value: NodeAddress) -> Self {
        value.0
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage backend of the keyring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyringBackend {
    /// Password-encrypted files
    File,
    /// Operating system keystore
    #[default]
    Os,
    /// Unencrypted files, for testing
    Test,
}

impl KeyringBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyringBackend::File => "file",
            KeyringBackend::Os => "os",
            KeyringBackend::Test => "test",
        }
    }

    /// Check a password against the backend's requirements
    pub fn validate_password(&self, password: &str) -> Result<(), ValidationError> {
        if *self != KeyringBackend::File {
            return Ok(());
        }
        if password.is_empty() {
            return Err(ValidationError::new("password cannot be empty"));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ValidationError::new(format!(
                "password length cannot be less than {}",
                MIN_PASSWORD_LEN
            )));
        }
        Ok(())
    }
}

impl FromStr for KeyringBackend {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(Self::File),
            "os" => Ok(Self::Os),
            "test" => Ok(Self::Test),
            "" => Err(ValidationError::new("backend cannot be empty")),
            _ => Err(ValidationError::new("backend must be one of [file, os, test]")),
        }
    }
}

impl fmt::Display for KeyringBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
