//! JSON bodies exchanged with nodes and local daemons
//!
//! Every HTTP response in the system, whether from a node's handshake
//! endpoint or from one of the local daemons, uses the same envelope:
//!
//! ```json
//! {"success": false, "error": {"code": 1002, "message": "..."}}
//! {"success": true, "result": ...}
//! ```

use serde::{Deserialize, Serialize};

/// Error carried inside an [`Envelope`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeError {
    /// Stable numeric code
    pub code: u32,
    /// Human-readable message
    pub message: String,
}

/// Uniform response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<EnvelopeError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
}

impl<T> Envelope<T> {
    /// Successful envelope, optionally carrying a result
    pub fn ok(result: Option<T>) -> Self {
        Self {
            success: true,
            error: None,
            result,
        }
    }

    /// Failed envelope
    pub fn err(code: u32, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(EnvelopeError {
                code,
                message: message.into(),
            }),
            result: None,
        }
    }

    /// Convert into a `Result`, treating a missing error on failure as code 0
    pub fn into_result(self) -> Result<Option<T>, EnvelopeError> {
        match self.error {
            Some(e) => Err(e),
            None if !self.success => Err(EnvelopeError {
                code: 0,
                message: "request failed without an error message".to_string(),
            }),
            None => Ok(self.result),
        }
    }
}

/// Body POSTed to `<remote>/accounts/<account>/sessions/<id>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeRequest {
    /// Base64 identity: a WireGuard public key or 16 relay identity bytes
    pub key: String,
    /// Base64 signature over the big-endian session id
    pub signature: String,
}

/// Path of the handshake endpoint relative to a node's remote URL
pub fn handshake_path(account: &str, session_id: u64) -> String {
    format!("/accounts/{}/sessions/{}", account, session_id)
}
