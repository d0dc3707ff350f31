//! Node listing
//!
//! Fetches active nodes from the ledger and asks each one for its live
//! status. Requests run concurrently but never more than
//! `nodes.concurrency` at a time.

use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use serde::Serialize;

use hv_core::config::NodesConfig;
use hv_core::traits::{Ledger, Node};
use hv_core::LedgerError;

use crate::remote::{NodeClient, NodeInfo};

/// One rendered row of the node table
#[derive(Debug, Clone, Serialize)]
pub struct NodeRow {
    pub address: String,
    pub remote_url: String,
    /// Live status, when the node answered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<NodeInfo>,
    /// Round-trip time of the status request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    /// Why the status request failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

async fn probe(client: &NodeClient, node: Node, timeout: Duration) -> NodeRow {
    let started = Instant::now();
    let result = tokio::time::timeout(timeout, client.info(&node.remote_url)).await;
    let latency_ms = started.elapsed().as_millis() as u64;

    let (info, latency_ms, error) = match result {
        Ok(Ok(info)) => (Some(info), Some(latency_ms), None),
        Ok(Err(e)) => (None, None, Some(e.to_string())),
        Err(_) => (None, None, Some(format!("timed out after {:?}", timeout))),
    };

    NodeRow {
        address: node.address.to_string(),
        remote_url: node.remote_url,
        info,
        latency_ms,
        error,
    }
}

/// List active nodes with their live status, sorted by address
pub async fn list_nodes(
    ledger: &dyn Ledger,
    client: &NodeClient,
    config: &NodesConfig,
    limit: u32,
) -> Result<Vec<NodeRow>, LedgerError> {
    let nodes = ledger.nodes("active", limit).await?;
    tracing::debug!(
        "Probing {} nodes, {} at a time",
        nodes.len(),
        config.concurrency
    );

    let mut rows: Vec<NodeRow> = stream::iter(nodes)
        .map(|node| probe(client, node, config.timeout))
        .buffer_unordered(config.concurrency.max(1))
        .collect()
        .await;

    rows.sort_by(|a, b| a.address.cmp(&b.address));
    Ok(rows)
}
