//! Local RPC protocol for front-end to daemon communication
//!
//! Both daemons speak JSON over HTTP on loopback. Every route is a POST with
//! a JSON body and answers with an [`Envelope`](hv_protocol::Envelope).
//! Requests validate themselves before any handler does work.

use std::net::IpAddr;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::types::{KeyringBackend, NodeAddress};

/// Prefix every route is mounted under
pub const API_PREFIX: &str = "/api/v1";

/// Service daemon routes
pub mod routes {
    pub const SERVICE_GET_STATUS: &str = "/Service.GetStatus";
    pub const SERVICE_CONNECT: &str = "/Service.Connect";
    pub const SERVICE_DISCONNECT: &str = "/Service.Disconnect";

    pub const KEYRING_ADD_KEY: &str = "/Keyring.AddKey";
    pub const KEYRING_GET_KEYS: &str = "/Keyring.GetKeys";
    pub const KEYRING_GET_KEY: &str = "/Keyring.GetKey";
    pub const KEYRING_SIGN_MESSAGE: &str = "/Keyring.SignMessage";
    pub const KEYRING_SIGN_BYTES: &str = "/Keyring.SignBytes";
    pub const KEYRING_DELETE_KEY: &str = "/Keyring.DeleteKey";
}

/// Highest accepted session quality rating
pub const MAX_RATING: u64 = 10;

/// Default BIP44 coin type for derived keys
pub const DEFAULT_COIN_TYPE: u32 = 118;

/// Backend and password carried by every keyring-touching request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyringAuth {
    #[serde(default)]
    pub backend: String,
    #[serde(default)]
    pub password: String,
}

impl KeyringAuth {
    pub fn new(backend: KeyringBackend, password: impl Into<String>) -> Self {
        Self {
            backend: backend.to_string(),
            password: password.into(),
        }
    }

    /// Validate and resolve the backend
    pub fn validate(&self) -> Result<KeyringBackend, ValidationError> {
        let backend: KeyringBackend = self.backend.parse()?;
        backend.validate_password(&self.password)?;
        Ok(backend)
    }
}

fn require_key_name(field: &str, name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::new(format!("{} cannot be empty", field)));
    }
    if name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(ValidationError::new(format!(
            "{} cannot contain path separators",
            field
        )));
    }
    Ok(())
}

fn require_name(name: &str) -> Result<(), ValidationError> {
    require_key_name("name", name)
}

/// Body of `Service.Connect`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectRequest {
    #[serde(flatten)]
    pub auth: KeyringAuth,
    /// Key name that owns the account
    #[serde(default)]
    pub from: String,
    /// Subscription or plan id
    #[serde(default)]
    pub id: u64,
    /// Node address
    #[serde(default)]
    pub to: String,
    /// Extra DNS resolvers
    #[serde(default)]
    pub resolvers: Vec<IpAddr>,
    /// Quality rating for the session being ended, if any
    #[serde(default)]
    pub rating: u64,
}

impl ConnectRequest {
    pub fn validate(&self) -> Result<(KeyringBackend, NodeAddress), ValidationError> {
        let backend = self.auth.validate()?;
        require_key_name("from", &self.from)?;
        if self.id == 0 {
            return Err(ValidationError::new("id cannot be zero"));
        }
        if self.to.is_empty() {
            return Err(ValidationError::new("to cannot be empty"));
        }
        let to: NodeAddress = self.to.parse()?;
        if self.rating > MAX_RATING {
            return Err(ValidationError::new(format!(
                "rating cannot be greater than {}",
                MAX_RATING
            )));
        }
        Ok((backend, to))
    }
}

/// Body of `Keyring.GetKeys`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetKeysRequest {
    #[serde(flatten)]
    pub auth: KeyringAuth,
}

impl GetKeysRequest {
    pub fn validate(&self) -> Result<KeyringBackend, ValidationError> {
        self.auth.validate()
    }
}

/// Body of `Keyring.GetKey` and `Keyring.DeleteKey`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyNameRequest {
    #[serde(flatten)]
    pub auth: KeyringAuth,
    #[serde(default)]
    pub name: String,
}

impl KeyNameRequest {
    pub fn validate(&self) -> Result<KeyringBackend, ValidationError> {
        let backend = self.auth.validate()?;
        require_name(&self.name)?;
        Ok(backend)
    }
}

/// Body of `Keyring.AddKey`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddKeyRequest {
    #[serde(flatten)]
    pub auth: KeyringAuth,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mnemonic: String,
    #[serde(default = "default_coin_type")]
    pub coin_type: u32,
    #[serde(default)]
    pub account: u32,
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub bip39_password: String,
}

fn default_coin_type() -> u32 {
    DEFAULT_COIN_TYPE
}

impl AddKeyRequest {
    pub fn validate(&self) -> Result<KeyringBackend, ValidationError> {
        let backend = self.auth.validate()?;
        require_name(&self.name)?;
        if self.mnemonic.is_empty() {
            return Err(ValidationError::new("mnemonic cannot be empty"));
        }
        if bip39::Mnemonic::parse_normalized(&self.mnemonic).is_err() {
            return Err(ValidationError::new("invalid mnemonic"));
        }
        Ok(backend)
    }
}

/// Body of `Keyring.SignMessage`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignRequest {
    #[serde(flatten)]
    pub auth: KeyringAuth,
    #[serde(default)]
    pub name: String,
    /// Base64 bytes to sign
    #[serde(default)]
    pub bytes: String,
}

impl SignRequest {
    /// Validate and decode the payload
    pub fn validate(&self) -> Result<(KeyringBackend, Vec<u8>), ValidationError> {
        let backend = self.auth.validate()?;
        require_name(&self.name)?;
        let bytes = STANDARD
            .decode(self.bytes.as_bytes())
            .map_err(|e| ValidationError::new(format!("bytes must be base64: {}", e)))?;
        Ok((backend, bytes))
    }
}

/// A stored key, as returned by the keyring daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInfo {
    pub name: String,
    /// Base64 public key
    pub pub_key: String,
    /// Bech32 account address
    pub address: String,
}

/// Result of `Keyring.SignMessage`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignResponse {
    /// Base64 public key
    pub public_key: String,
    /// Base64 signature
    pub signature: String,
}

/// Orchestrator lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Disconnecting => write!(f, "disconnecting"),
        }
    }
}

/// A connect attempt that changed ledger state but did not finish
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureInfo {
    /// Stable error code
    pub code: u32,
    /// Session involved, if one was known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<u64>,
    /// Step that failed
    pub stage: String,
    pub message: String,
    /// Unix time of the failure
    pub at: u64,
}

/// Result of `Service.GetStatus`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub state: ConnectionState,
    /// Session id, 0 when disconnected
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    /// Backend type (0 none, 1 WireGuard, 2 V2Ray)
    #[serde(default, rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub iface: String,
    /// Live result of the backend's liveness probe
    #[serde(default)]
    pub is_up: bool,
    #[serde(default)]
    pub upload: u64,
    #[serde(default)]
    pub download: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<FailureInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn test_auth() -> KeyringAuth {
        KeyringAuth::new(KeyringBackend::Test, "")
    }

    fn node() -> String {
        NodeAddress::from_bytes(&[1u8; 20]).to_string()
    }

    #[test]
    fn test_connect_request_from_json() {
        let json = format!(
            r#"{{"backend":"test","password":"","from":"alice","id":3,"to":"{}","resolvers":["1.1.1.1"],"rating":5}}"#,
            node()
        );
        let request: ConnectRequest = serde_json::from_str(&json).unwrap();
        let (backend, to) = request.validate().unwrap();
        assert_eq!(backend, KeyringBackend::Test);
        assert_eq!(to.to_string(), node());
        assert_eq!(request.resolvers.len(), 1);
    }

    #[test]
    fn test_connect_request_rules() {
        let valid = ConnectRequest {
            auth: test_auth(),
            from: "alice".into(),
            id: 1,
            to: node(),
            resolvers: vec![],
            rating: 0,
        };
        assert!(valid.validate().is_ok());

        let cases = [
            (ConnectRequest { id: 0, ..valid.clone() }, "id cannot be zero"),
            (ConnectRequest { from: String::new(), ..valid.clone() }, "from cannot be empty"),
            (ConnectRequest { to: String::new(), ..valid.clone() }, "to cannot be empty"),
            (ConnectRequest { rating: 11, ..valid.clone() }, "rating cannot be greater than 10"),
            (
                ConnectRequest {
                    auth: KeyringAuth::new(KeyringBackend::File, "short"),
                    ..valid.clone()
                },
                "password length cannot be less than 8",
            ),
        ];

        for (request, message) in cases {
            assert_eq!(request.validate().unwrap_err().to_string(), message);
        }

        let wrong_prefix = ConnectRequest {
            to: crate::types::AccAddress::from_bytes(&[1u8; 20]).to_string(),
            ..valid
        };
        assert!(wrong_prefix.validate().is_err());
    }

    #[test]
    fn test_add_key_mnemonic() {
        let mut request = AddKeyRequest {
            auth: test_auth(),
            name: "alice".into(),
            mnemonic: MNEMONIC.into(),
            coin_type: DEFAULT_COIN_TYPE,
            account: 0,
            index: 0,
            bip39_password: String::new(),
        };
        assert!(request.validate().is_ok());

        request.mnemonic = "abandon abandon".into();
        assert_eq!(request.validate().unwrap_err().to_string(), "invalid mnemonic");

        request.mnemonic = String::new();
        assert_eq!(
            request.validate().unwrap_err().to_string(),
            "mnemonic cannot be empty"
        );
    }

    #[test]
    fn test_add_key_default_coin_type() {
        let request: AddKeyRequest =
            serde_json::from_str(r#"{"backend":"test","name":"a","mnemonic":"x"}"#).unwrap();
        assert_eq!(request.coin_type, 118);
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let request = KeyNameRequest {
            auth: KeyringAuth {
                backend: "kwallet".into(),
                password: String::new(),
            },
            name: "alice".into(),
        };
        assert_eq!(
            request.validate().unwrap_err().to_string(),
            "backend must be one of [file, os, test]"
        );
    }

    #[test]
    fn test_key_name_cannot_escape_keyring() {
        let request = KeyNameRequest {
            auth: test_auth(),
            name: "../alice".into(),
        };
        assert_eq!(
            request.validate().unwrap_err().to_string(),
            "name cannot contain path separators"
        );
    }

    #[test]
    fn test_sign_request_requires_base64() {
        let request = SignRequest {
            auth: test_auth(),
            name: "alice".into(),
            bytes: "!!".into(),
        };
        assert!(request.validate().is_err());

        let request = SignRequest {
            bytes: "AAE=".into(),
            ..request
        };
        assert_eq!(request.validate().unwrap().1, vec![0, 1]);
    }

    #[test]
    fn test_status_response_shape() {
        let response = StatusResponse::default();
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["state"], "disconnected");
        assert!(value.get("last_failure").is_none());
    }
}
