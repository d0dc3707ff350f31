//! HTTP client for a node's remote API
//!
//! Certificate validation is relaxed by default: nodes use self-signed
//! certificates and the session handshake is authenticated by the account
//! signature instead. `handshake.accept_invalid_certs = false` tightens it.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use hv_core::config::HandshakeConfig;
use hv_core::{AccAddress, RemoteError};
use hv_protocol::{handshake_path, Envelope, HandshakeRequest, NodeType, SessionId};

/// Physical location a node reports
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Location {
    pub city: String,
    pub country: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Measured link speed a node reports, in bytes per second
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bandwidth {
    pub upload: u64,
    pub download: u64,
}

/// Body of `<remote_url>/status`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeInfo {
    pub address: String,
    pub moniker: String,
    #[serde(rename = "type")]
    pub kind: u64,
    pub location: Location,
    pub peers: u64,
    pub bandwidth: Bandwidth,
    pub version: String,
}

impl NodeInfo {
    /// Declared tunnel technology
    pub fn node_type(&self) -> Option<NodeType> {
        NodeType::from_u64(self.kind)
    }
}

/// Client for node remote APIs
#[derive(Debug, Clone)]
pub struct NodeClient {
    client: reqwest::Client,
}

impl NodeClient {
    pub fn new(config: &HandshakeConfig) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|source| RemoteError::Transport {
                url: String::new(),
                source,
            })?;
        Ok(Self { client })
    }

    fn endpoint(remote_url: &str, path: &str) -> String {
        format!("{}{}", remote_url.trim_end_matches('/'), path)
    }

    async fn read_envelope<T: DeserializeOwned>(
        url: &str,
        response: reqwest::Response,
    ) -> Result<T, RemoteError> {
        let status = response.status();
        let envelope = match response.json::<Envelope<T>>().await {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => return Err(RemoteError::Status(status.as_u16())),
            Err(source) => {
                return Err(RemoteError::Transport {
                    url: url.to_string(),
                    source,
                })
            }
        };

        match envelope.into_result() {
            Ok(Some(result)) => Ok(result),
            Ok(None) => Err(RemoteError::MissingResult),
            Err(e) => Err(RemoteError::Envelope {
                code: e.code,
                message: e.message,
            }),
        }
    }

    /// Fetch `<remote_url>/status`
    pub async fn info(&self, remote_url: &str) -> Result<NodeInfo, RemoteError> {
        let url = Self::endpoint(remote_url, "/status");
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| RemoteError::Transport {
                url: url.clone(),
                source,
            })?;
        Self::read_envelope(&url, response).await
    }

    /// Submit the identity for a session and return the raw handshake payload
    pub async fn handshake(
        &self,
        remote_url: &str,
        account: &AccAddress,
        session: SessionId,
        request: &HandshakeRequest,
    ) -> Result<Vec<u8>, RemoteError> {
        let url = Self::endpoint(
            remote_url,
            &handshake_path(account.as_str(), session.as_u64()),
        );
        tracing::debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|source| RemoteError::Transport {
                url: url.clone(),
                source,
            })?;

        let result: String = Self::read_envelope(&url, response).await?;
        Ok(STANDARD.decode(result.trim())?)
    }
}
