//! CLI command implementations

mod config;
mod connect;
mod keys;
mod nodes;
mod start;
mod status;

pub use config::{config_get, config_init, config_set, config_show};
pub use connect::{connect_command, disconnect_command, ConnectArgs};
pub use keys::{keys_add, keys_delete, keys_list, keys_show, AddKeyArgs};
pub use nodes::nodes_command;
pub use start::start_command;
pub use status::status_command;

use std::io::BufRead;

use anyhow::{Context, Result};

use hv_core::KeyringBackend;

/// Environment variable holding the keyring password
pub const PASSWORD_ENV: &str = "HUBVPN_KEYRING_PASSWORD";

/// Resolve the keyring password for `backend`
///
/// Only the file backend takes a password. It comes from `explicit` (the
/// `--password` flag or [`PASSWORD_ENV`]) or, failing that, the first line
/// of stdin.
pub fn keyring_password(backend: KeyringBackend, explicit: Option<String>) -> Result<String> {
    if backend != KeyringBackend::File {
        return Ok(String::new());
    }
    if let Some(password) = explicit {
        return Ok(password);
    }

    eprintln!("Enter keyring password:");
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read keyring password from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
