//! Status command implementation

use std::path::Path;

use anyhow::Result;

use crate::ipc::ServiceClient;
use crate::output::{format_status, print_error};

/// Execute the status command
pub async fn status_command(home: &Path, json: bool) -> Result<()> {
    let client = ServiceClient::discover(home)?;

    let status = match client.status().await {
        Ok(s) => s,
        Err(e) => {
            print_error(&format!("Failed to get status: {}", e));
            return Err(e.into());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("{}", format_status(&status));
    }

    Ok(())
}
