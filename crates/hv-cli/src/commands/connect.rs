//! Connect and disconnect commands

use std::net::IpAddr;
use std::path::Path;

use anyhow::Result;

use crate::ipc::{ConnectRequest, KeyringAuth, ServiceClient};
use crate::output::{print_error, print_info, print_success, print_warning};
use hv_core::KeyringBackend;

/// Everything `hubvpn connect` needs
#[derive(Debug, Clone)]
pub struct ConnectArgs {
    /// Subscription or plan id
    pub id: u64,
    /// Node address
    pub node: String,
    /// Key name paying for the session
    pub from: String,
    pub resolvers: Vec<IpAddr>,
    pub rating: u64,
    pub backend: KeyringBackend,
    pub password: String,
}

/// Execute the connect command
pub async fn connect_command(home: &Path, args: ConnectArgs) -> Result<()> {
    let client = ServiceClient::discover(home)?;

    let request = ConnectRequest {
        auth: KeyringAuth::new(args.backend, args.password),
        from: args.from,
        id: args.id,
        to: args.node.clone(),
        resolvers: args.resolvers,
        rating: args.rating,
    };

    print_info(&format!("Connecting to {}...", args.node));
    if let Err(e) = client.connect(&request).await {
        print_error(&format!("Failed to connect: {}", e));
        // A half-finished attempt is described by the status record
        if let Ok(status) = client.status().await {
            if let Some(failure) = status.last_failure {
                print_warning(&format!(
                    "Failed at {}: {}",
                    failure.stage, failure.message
                ));
            }
        }
        return Err(e.into());
    }

    let status = client.status().await?;
    print_success(&format!(
        "Connected: session {} on {}",
        status.id,
        if status.iface.is_empty() { "-" } else { status.iface.as_str() }
    ));
    Ok(())
}

/// Execute the disconnect command
pub async fn disconnect_command(home: &Path) -> Result<()> {
    let client = ServiceClient::discover(home)?;

    match client.disconnect().await {
        Ok(()) => {
            print_success("Disconnected");
            Ok(())
        }
        Err(e) => {
            print_error(&format!("Failed to disconnect: {}", e));
            Err(e.into())
        }
    }
}
