//! Envelope-aware clients for the service and keyring daemons

use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use hv_core::discovery::read_url_file;
use hv_core::ipc::{
    routes, AddKeyRequest, ConnectRequest, GetKeysRequest, KeyInfo, KeyNameRequest, KeyringAuth,
    StatusResponse,
};
use hv_protocol::Envelope;

/// Failure talking to a daemon
#[derive(Debug, Error)]
pub enum CallError {
    #[error("{0}. Is the daemon running? Try: hubvpn start")]
    NotRunning(std::io::Error),

    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{message} (code {code})")]
    Remote { code: u32, message: String },

    #[error("daemon answered without a result")]
    EmptyResult,
}

/// Raw client for one daemon
#[derive(Debug, Clone)]
pub struct DaemonClient {
    base_url: String,
    http: reqwest::Client,
}

impl DaemonClient {
    /// Locate the daemon serving `home`
    pub fn discover(home: &Path) -> Result<Self, CallError> {
        let base_url = read_url_file(home).map_err(CallError::NotRunning)?;
        Ok(Self::with_url(base_url))
    }

    /// Create a client for a known base URL
    pub fn with_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST `body` to `route` and unwrap the envelope
    pub async fn call<B, T>(&self, route: &str, body: &B) -> Result<Option<T>, CallError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, route);
        tracing::debug!("POST {}", url);

        let http_err = |source| CallError::Http {
            url: url.clone(),
            source,
        };

        // Error statuses still carry an envelope, so the body is read regardless
        let response = self.http.post(&url).json(body).send().await.map_err(http_err)?;
        let envelope: Envelope<T> = response.json().await.map_err(http_err)?;

        envelope.into_result().map_err(|e| CallError::Remote {
            code: e.code,
            message: e.message,
        })
    }

    async fn call_for<B, T>(&self, route: &str, body: &B) -> Result<T, CallError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.call(route, body).await?.ok_or(CallError::EmptyResult)
    }
}

/// Client for the service daemon
#[derive(Debug, Clone)]
pub struct ServiceClient {
    inner: DaemonClient,
}

impl ServiceClient {
    pub fn discover(home: &Path) -> Result<Self, CallError> {
        DaemonClient::discover(home).map(|inner| Self { inner })
    }

    pub fn base_url(&self) -> &str {
        self.inner.base_url()
    }

    pub async fn status(&self) -> Result<StatusResponse, CallError> {
        self.inner
            .call_for(routes::SERVICE_GET_STATUS, &serde_json::json!({}))
            .await
    }

    pub async fn connect(&self, request: &ConnectRequest) -> Result<(), CallError> {
        self.inner
            .call::<_, serde_json::Value>(routes::SERVICE_CONNECT, request)
            .await
            .map(|_| ())
    }

    pub async fn disconnect(&self) -> Result<(), CallError> {
        self.inner
            .call::<_, serde_json::Value>(routes::SERVICE_DISCONNECT, &serde_json::json!({}))
            .await
            .map(|_| ())
    }
}

/// Client for the keyring daemon
#[derive(Debug, Clone)]
pub struct KeyringClient {
    inner: DaemonClient,
    auth: KeyringAuth,
}

impl KeyringClient {
    /// Locate the keyring daemon serving `keyring_home`
    pub fn discover(keyring_home: &Path, auth: KeyringAuth) -> Result<Self, CallError> {
        DaemonClient::discover(keyring_home).map(|inner| Self { inner, auth })
    }

    pub async fn add_key(&self, mut request: AddKeyRequest) -> Result<KeyInfo, CallError> {
        request.auth = self.auth.clone();
        self.inner.call_for(routes::KEYRING_ADD_KEY, &request).await
    }

    pub async fn keys(&self) -> Result<Vec<KeyInfo>, CallError> {
        let request = GetKeysRequest {
            auth: self.auth.clone(),
        };
        // An empty keyring may come back without a result
        Ok(self
            .inner
            .call(routes::KEYRING_GET_KEYS, &request)
            .await?
            .unwrap_or_default())
    }

    pub async fn key(&self, name: &str) -> Result<KeyInfo, CallError> {
        self.inner
            .call_for(routes::KEYRING_GET_KEY, &self.name_request(name))
            .await
    }

    pub async fn delete_key(&self, name: &str) -> Result<(), CallError> {
        self.inner
            .call::<_, serde_json::Value>(routes::KEYRING_DELETE_KEY, &self.name_request(name))
            .await
            .map(|_| ())
    }

    fn name_request(&self, name: &str) -> KeyNameRequest {
        KeyNameRequest {
            auth: self.auth.clone(),
            name: name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_without_daemon() {
        let dir = tempfile::tempdir().unwrap();
        let err = ServiceClient::discover(dir.path()).unwrap_err();
        assert!(matches!(err, CallError::NotRunning(_)));
        assert!(err.to_string().contains("hubvpn start"));
    }

    #[test]
    fn test_discover_reads_url_file() {
        let dir = tempfile::tempdir().unwrap();
        hv_core::discovery::write_url_file(dir.path(), "http://127.0.0.1:9/api/v1/").unwrap();

        let client = ServiceClient::discover(dir.path()).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:9/api/v1");
    }

    #[tokio::test]
    async fn test_unreachable_daemon_is_http_error() {
        // Nothing listens on the discard port
        let client = DaemonClient::with_url("http://127.0.0.1:9/api/v1");
        let err = client
            .call::<_, StatusResponse>(routes::SERVICE_GET_STATUS, &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::Http { .. }));
    }
}
