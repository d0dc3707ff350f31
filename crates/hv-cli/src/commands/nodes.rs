//! Node listing command

use anyhow::{Context, Result};

use crate::output::{format_nodes, print_error};
use hv_core::config::DaemonConfig;
use hv_daemon::ledger::RestLedger;
use hv_daemon::nodes::list_nodes;
use hv_daemon::remote::NodeClient;

/// List active nodes with their live status
///
/// Talks to the ledger and nodes directly; no daemon is needed.
pub async fn nodes_command(config: &DaemonConfig, limit: u32, json: bool) -> Result<()> {
    let ledger = RestLedger::new(&config.ledger).context("Failed to create ledger client")?;
    let client = NodeClient::new(&config.handshake).context("Failed to create node client")?;

    let rows = match list_nodes(&ledger, &client, &config.nodes, limit).await {
        Ok(rows) => rows,
        Err(e) => {
            print_error(&format!("Failed to list nodes: {}", e));
            return Err(e.into());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        println!("{}", format_nodes(&rows));
    }
    Ok(())
}
