//! REST ledger client

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize};

use hv_core::config::LedgerConfig;
use hv_core::traits::{Ledger, Node, Session, SignedTx, TxResponse};
use hv_core::{AccAddress, LedgerError, NodeAddress};

#[derive(Deserialize)]
struct ResultBody<T> {
    result: T,
}

/// [`Ledger`] over a JSON REST gateway
#[derive(Debug, Clone)]
pub struct RestLedger {
    base: String,
    client: reqwest::Client,
}

impl RestLedger {
    pub fn new(config: &LedgerConfig) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LedgerError::Transport {
                url: config.rpc_address.clone(),
                message: e.to_string(),
            })?;
        Ok(Self {
            base: config.rpc_address.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn decode<T: DeserializeOwned>(
        url: &str,
        response: reqwest::Response,
    ) -> Result<Option<T>, LedgerError> {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::Transport {
                url: url.to_string(),
                message: format!("HTTP {}: {}", status.as_u16(), body.trim()),
            });
        }
        let body: ResultBody<T> = response
            .json()
            .await
            .map_err(|e| LedgerError::Decode(format!("{}: {}", url, e)))?;
        Ok(Some(body.result))
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, LedgerError> {
        let url = self.url(path);
        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| LedgerError::Transport {
                url: url.clone(),
                message: e.to_string(),
            })?;
        Self::decode(&url, response).await
    }
}

#[async_trait]
impl Ledger for RestLedger {
    async fn account_session(&self, account: &AccAddress) -> Result<Option<Session>, LedgerError> {
        let sessions: Vec<Session> = self
            .get(
                "/sessions",
                &[
                    ("account", account.to_string()),
                    ("status", "active".to_string()),
                ],
            )
            .await?
            .unwrap_or_default();
        Ok(sessions.into_iter().next())
    }

    async fn node(&self, address: &NodeAddress) -> Result<Node, LedgerError> {
        self.get(&format!("/nodes/{}", address), &[])
            .await?
            .ok_or_else(|| LedgerError::NodeNotFound(address.to_string()))
    }

    async fn nodes(&self, status: &str, limit: u32) -> Result<Vec<Node>, LedgerError> {
        Ok(self
            .get(
                "/nodes",
                &[("status", status.to_string()), ("limit", limit.to_string())],
            )
            .await?
            .unwrap_or_default())
    }

    async fn broadcast(&self, tx: SignedTx) -> Result<TxResponse, LedgerError> {
        let url = self.url("/txs");
        tracing::debug!("POST {} ({} messages)", url, tx.body.messages.len());

        let response = self
            .client
            .post(&url)
            .json(&tx)
            .send()
            .await
            .map_err(|e| LedgerError::Transport {
                url: url.clone(),
                message: e.to_string(),
            })?;

        let result: TxResponse = Self::decode(&url, response)
            .await?
            .ok_or_else(|| LedgerError::Decode(format!("{}: not found", url)))?;

        if result.code != 0 {
            return Err(LedgerError::Broadcast {
                txhash: result.txhash,
                code: result.code,
                log: result.raw_log,
            });
        }
        tracing::info!("Transaction {} committed", result.txhash);
        Ok(result)
    }
}
