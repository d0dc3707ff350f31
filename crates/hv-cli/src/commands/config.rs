//! Config command implementations

use std::path::Path;

use anyhow::{Context, Result};

use crate::output::{print_error, print_info, print_success};
use hv_core::config::{self, DaemonConfig};

/// Print the effective configuration for `home` as TOML
pub fn config_show(home: &Path) -> Result<()> {
    let path = config::config_path(home);
    let config = config::load_or_default(home)
        .with_context(|| format!("Failed to load config from {:?}", path))?;

    if path.exists() {
        print_info(&format!("Configuration file: {:?}", path));
    } else {
        print_info(&format!("No configuration file at {:?}, showing defaults", path));
    }
    println!();
    println!("{}", render(&config)?);

    Ok(())
}

/// Write the default configuration into `home`
pub fn config_init(home: &Path, force: bool) -> Result<()> {
    let path = config::config_path(home);

    if path.exists() && !force {
        print_error(&format!("Config file already exists: {:?}", path));
        print_info("Use --force to overwrite");
        return Ok(());
    }

    config::save_config(&path, &DaemonConfig::default())
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    print_success(&format!("Created configuration file: {:?}", path));
    Ok(())
}

/// Print one value by dotted key, e.g. `ledger.rpc_address`
pub fn config_get(home: &Path, key: &str) -> Result<()> {
    let config = config::load_or_default(home)?;
    let table: toml::Table = toml::from_str(&render(&config)?)?;

    let mut current = &toml::Value::Table(table);
    for part in key.split('.') {
        current = match current.as_table().and_then(|t| t.get(part)) {
            Some(v) => v,
            None => anyhow::bail!("Key not found: {}", key),
        };
    }

    match current {
        toml::Value::String(s) => println!("{}", s),
        toml::Value::Table(_) => println!("{}", toml::to_string_pretty(current)?),
        other => println!("{}", other),
    }

    Ok(())
}

/// Set one value by dotted key
///
/// The edited file must still load as a valid configuration before it is
/// written back.
pub fn config_set(home: &Path, key: &str, value: &str) -> Result<()> {
    let path = config::config_path(home);
    let mut table: toml::Table = if path.exists() {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).context("Failed to parse config file")?
    } else {
        toml::Table::new()
    };

    let parts: Vec<&str> = key.split('.').collect();
    let (last, parents) = match parts.split_last() {
        Some((last, parents)) if !last.is_empty() => (*last, parents),
        _ => anyhow::bail!("Invalid key: {:?}", key),
    };

    let mut current = &mut table;
    for part in parents {
        current = current
            .entry(part.to_string())
            .or_insert(toml::Value::Table(toml::Table::new()))
            .as_table_mut()
            .ok_or_else(|| anyhow::anyhow!("Cannot navigate to key: {}", key))?;
    }
    current.insert(last.to_string(), parse_value(value));

    let content = toml::to_string_pretty(&table)?;
    let config: DaemonConfig =
        toml::from_str(&content).with_context(|| format!("Invalid value for {}", key))?;
    config.validate()?;

    std::fs::create_dir_all(home)
        .with_context(|| format!("Failed to create home directory: {:?}", home))?;
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    print_success(&format!("Set {} = {}", key, value));
    Ok(())
}

fn parse_value(value: &str) -> toml::Value {
    if let Ok(b) = value.parse::<bool>() {
        toml::Value::Boolean(b)
    } else if let Ok(i) = value.parse::<i64>() {
        toml::Value::Integer(i)
    } else if let Ok(f) = value.parse::<f64>() {
        toml::Value::Float(f)
    } else {
        toml::Value::String(value.to_string())
    }
}

fn render(config: &DaemonConfig) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to serialize config")
}
