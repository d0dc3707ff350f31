//! hubvpn - dVPN client
//!
//! Single binary that runs the local daemons and talks to them.
//!
//! # Usage
//!
//! ```bash
//! # Run the service and keyring daemons
//! hubvpn start
//!
//! # Create a key and connect through a node
//! hubvpn keys add alice --backend test
//! hubvpn connect 42 sentnode1... --from alice --backend test
//!
//! # Check the tunnel and tear it down
//! hubvpn status
//! hubvpn disconnect
//! ```

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hv_core::config::{self, DaemonConfig, HOME_ENV};
use hv_core::ipc::{KeyringAuth, DEFAULT_COIN_TYPE};
use hv_core::KeyringBackend;
use hv_daemon::gateway::RunOptions;

use hubvpn::commands::{self, keyring_password, AddKeyArgs, ConnectArgs, PASSWORD_ENV};
use hubvpn::output::print_error;

#[derive(Parser)]
#[command(name = "hubvpn")]
#[command(about = "Paid dVPN client - connect through WireGuard and V2Ray nodes")]
#[command(version)]
struct Cli {
    /// Home directory
    #[arg(long, global = true, env = HOME_ENV)]
    home: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress log output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Keyring selection shared by key-touching commands
#[derive(clap::Args, Debug, Clone)]
struct KeyringOpts {
    /// Keyring backend (file, os, test); defaults to the configured one
    #[arg(long)]
    backend: Option<String>,

    /// Keyring password for the file backend
    #[arg(long, env = PASSWORD_ENV, hide_env_values = true)]
    password: Option<String>,
}

impl KeyringOpts {
    fn resolve(self, config: &DaemonConfig) -> Result<KeyringAuth> {
        let backend = match self.backend {
            Some(name) => name.parse::<KeyringBackend>()?,
            None => config.keyring.backend,
        };
        let password = keyring_password(backend, self.password)?;
        Ok(KeyringAuth::new(backend, password))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the service and keyring daemons in the foreground
    Start {
        /// Do not run the service daemon
        #[arg(long)]
        no_service: bool,

        /// Do not run the keyring daemon
        #[arg(long)]
        no_keyring: bool,

        /// Service daemon address (overrides config)
        #[arg(long)]
        listen_on: Option<String>,
    },

    /// Start a paid session with a node and bring the tunnel up
    Connect {
        /// Subscription or plan id
        id: u64,

        /// Node address (sentnode1...)
        node: String,

        /// Key paying for the session
        #[arg(long)]
        from: String,

        /// Extra DNS resolver (repeatable)
        #[arg(long = "resolver")]
        resolvers: Vec<IpAddr>,

        /// Rating for the session being ended, 0-10
        #[arg(long, default_value_t = 0)]
        rating: u64,

        #[command(flatten)]
        keyring: KeyringOpts,
    },

    /// Tear down the tunnel
    Disconnect,

    /// Show connection status
    Status {
        /// Print the raw status as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage keys
    Keys {
        #[command(subcommand)]
        action: KeysAction,
    },

    /// List active nodes with their live status
    Nodes {
        /// Maximum number of nodes to query
        #[arg(long, default_value_t = 100)]
        limit: u32,

        /// Print rows as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum KeysAction {
    /// Create a key from a new mnemonic, or recover one from stdin
    Add {
        name: String,

        /// Read the mnemonic from stdin
        #[arg(long)]
        recover: bool,

        #[arg(long, default_value_t = DEFAULT_COIN_TYPE)]
        coin_type: u32,

        #[arg(long, default_value_t = 0)]
        account: u32,

        #[arg(long, default_value_t = 0)]
        index: u32,

        #[command(flatten)]
        keyring: KeyringOpts,
    },

    /// List keys
    List {
        #[command(flatten)]
        keyring: KeyringOpts,
    },

    /// Show one key
    Show {
        name: String,

        #[command(flatten)]
        keyring: KeyringOpts,
    },

    /// Delete a key
    Delete {
        name: String,

        #[command(flatten)]
        keyring: KeyringOpts,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Write the default configuration
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Get a value by dotted key
    Get { key: String },

    /// Set a value by dotted key
    Set { key: String, value: String },

    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.to_string()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if let Err(e) = run(cli).await {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let home = cli.home.unwrap_or_else(config::default_home_dir);

    // Config subcommands work on the file itself and must not fail on it
    let command = match cli.command {
        Commands::Config { action } => return config_command(&home, action),
        other => other,
    };

    let config = config::load_or_default(&home)
        .with_context(|| format!("Failed to load config from {:?}", home))?;

    match command {
        Commands::Start {
            no_service,
            no_keyring,
            listen_on,
        } => {
            let options = RunOptions {
                service: !no_service,
                keyring: !no_keyring,
                listen_on,
            };
            commands::start_command(config, options).await
        }

        Commands::Connect {
            id,
            node,
            from,
            resolvers,
            rating,
            keyring,
        } => {
            let auth = keyring.resolve(&config)?;
            let backend = auth.validate()?;
            let args = ConnectArgs {
                id,
                node,
                from,
                resolvers,
                rating,
                backend,
                password: auth.password,
            };
            commands::connect_command(&config.home, args).await
        }

        Commands::Disconnect => commands::disconnect_command(&config.home).await,

        Commands::Status { json } => commands::status_command(&config.home, json).await,

        Commands::Keys { action } => {
            let keyring_home = config.keyring.home.clone();
            match action {
                KeysAction::Add {
                    name,
                    recover,
                    coin_type,
                    account,
                    index,
                    keyring,
                } => {
                    let args = AddKeyArgs {
                        recover,
                        coin_type,
                        account,
                        index,
                        ..AddKeyArgs::new(name)
                    };
                    commands::keys_add(&keyring_home, keyring.resolve(&config)?, args).await
                }
                KeysAction::List { keyring } => {
                    commands::keys_list(&keyring_home, keyring.resolve(&config)?).await
                }
                KeysAction::Show { name, keyring } => {
                    commands::keys_show(&keyring_home, keyring.resolve(&config)?, &name).await
                }
                KeysAction::Delete { name, keyring } => {
                    commands::keys_delete(&keyring_home, keyring.resolve(&config)?, &name).await
                }
            }
        }

        Commands::Nodes { limit, json } => commands::nodes_command(&config, limit, json).await,

        Commands::Config { .. } => Ok(()),
    }
}

fn config_command(home: &std::path::Path, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => commands::config_show(home),
        ConfigAction::Init { force } => commands::config_init(home, force),
        ConfigAction::Get { key } => commands::config_get(home, &key),
        ConfigAction::Set { key, value } => commands::config_set(home, &key, &value),
        ConfigAction::Path => {
            println!("{}", config::config_path(home).display());
            Ok(())
        }
    }
}
