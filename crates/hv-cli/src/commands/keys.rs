//! Key management commands, served by the keyring daemon

use std::io::BufRead;
use std::path::Path;

use anyhow::{Context, Result};

use crate::ipc::{AddKeyRequest, KeyringAuth, KeyringClient};
use crate::output::{format_keys, print_error, print_info, print_success, print_warning};
use hv_core::ipc::DEFAULT_COIN_TYPE;
use hv_daemon::keyring::generate_mnemonic;

/// Options of `hubvpn keys add`
#[derive(Debug, Clone)]
pub struct AddKeyArgs {
    pub name: String,
    /// Read an existing mnemonic from stdin instead of generating one
    pub recover: bool,
    pub coin_type: u32,
    pub account: u32,
    pub index: u32,
}

impl AddKeyArgs {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            recover: false,
            coin_type: DEFAULT_COIN_TYPE,
            account: 0,
            index: 0,
        }
    }
}

fn client(keyring_home: &Path, auth: KeyringAuth) -> Result<KeyringClient> {
    Ok(KeyringClient::discover(keyring_home, auth)?)
}

/// Add a key, printing the mnemonic when one was generated
pub async fn keys_add(keyring_home: &Path, auth: KeyringAuth, args: AddKeyArgs) -> Result<()> {
    let client = client(keyring_home, auth.clone())?;

    let mnemonic = if args.recover {
        eprintln!("Enter mnemonic:");
        let mut line = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut line)
            .context("Failed to read mnemonic from stdin")?;
        line.trim().to_string()
    } else {
        generate_mnemonic()?
    };

    let request = AddKeyRequest {
        auth,
        name: args.name.clone(),
        mnemonic: mnemonic.clone(),
        coin_type: args.coin_type,
        account: args.account,
        index: args.index,
        bip39_password: String::new(),
    };

    let key = match client.add_key(request).await {
        Ok(key) => key,
        Err(e) => {
            print_error(&format!("Failed to add key {}: {}", args.name, e));
            return Err(e.into());
        }
    };

    print_success(&format!("Added key {} ({})", key.name, key.address));
    if !args.recover {
        print_warning("Write this mnemonic down. It is the only way to recover the key:");
        println!("{}", mnemonic);
    }
    Ok(())
}

pub async fn keys_list(keyring_home: &Path, auth: KeyringAuth) -> Result<()> {
    let keys = client(keyring_home, auth)?.keys().await?;
    println!("{}", format_keys(&keys));
    Ok(())
}

pub async fn keys_show(keyring_home: &Path, auth: KeyringAuth, name: &str) -> Result<()> {
    let key = client(keyring_home, auth)?.key(name).await?;
    println!("{}", format_keys(std::slice::from_ref(&key)));
    Ok(())
}

pub async fn keys_delete(keyring_home: &Path, auth: KeyringAuth, name: &str) -> Result<()> {
    client(keyring_home, auth)?.delete_key(name).await?;
    print_success(&format!("Deleted key {}", name));
    print_info("Funds held by its address are untouched");
    Ok(())
}
