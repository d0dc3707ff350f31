//! Output formatting utilities for the CLI
//!
//! Tables for keys, nodes and connection status, plus colored one-line
//! status messages.

use tabled::{
    settings::{Style, Width},
    Table, Tabled,
};

use hv_core::units::to_readable;
use hv_daemon::nodes::NodeRow;

use crate::ipc::{KeyInfo, StatusResponse};

/// Digits kept after the decimal point in byte counts
const BYTE_DECIMALS: usize = 2;

/// Format the connection status as a two-column table
pub fn format_status(status: &StatusResponse) -> String {
    #[derive(Tabled)]
    struct Field {
        #[tabled(rename = "FIELD")]
        name: &'static str,
        #[tabled(rename = "VALUE")]
        value: String,
    }

    let or_dash = |s: &str| {
        if s.is_empty() {
            "-".to_string()
        } else {
            s.to_string()
        }
    };

    let mut rows = vec![Field {
        name: "State",
        value: status.state.to_string(),
    }];

    if status.id != 0 {
        let kind = match status.kind {
            1 => "wireguard",
            2 => "v2ray",
            _ => "-",
        };
        rows.extend([
            Field {
                name: "Session",
                value: status.id.to_string(),
            },
            Field {
                name: "Account",
                value: or_dash(&status.from),
            },
            Field {
                name: "Node",
                value: or_dash(&status.to),
            },
            Field {
                name: "Type",
                value: kind.to_string(),
            },
            Field {
                name: "Interface",
                value: or_dash(&status.iface),
            },
            Field {
                name: "Up",
                value: if status.is_up { "yes" } else { "no" }.to_string(),
            },
            Field {
                name: "Upload",
                value: to_readable(status.upload, BYTE_DECIMALS),
            },
            Field {
                name: "Download",
                value: to_readable(status.download, BYTE_DECIMALS),
            },
        ]);
    }

    let mut output = Table::new(rows).with(Style::rounded()).to_string();

    if let Some(failure) = &status.last_failure {
        output.push_str(&format!(
            "\nLast failure at {} ({}): {} [code {}]",
            failure.stage, failure.at, failure.message, failure.code
        ));
        if let Some(session) = failure.session_id {
            output.push_str(&format!(" session {}", session));
        }
    }

    output
}

/// Format stored keys as a table
pub fn format_keys(keys: &[KeyInfo]) -> String {
    if keys.is_empty() {
        return "No keys".to_string();
    }

    #[derive(Tabled)]
    struct KeyRow {
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "ADDRESS")]
        address: String,
        #[tabled(rename = "PUBLIC KEY")]
        pub_key: String,
    }

    let rows: Vec<KeyRow> = keys
        .iter()
        .map(|k| KeyRow {
            name: k.name.clone(),
            address: k.address.clone(),
            pub_key: truncate(&k.pub_key, 20),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format probed nodes as a table
pub fn format_nodes(nodes: &[NodeRow]) -> String {
    if nodes.is_empty() {
        return "No active nodes".to_string();
    }

    #[derive(Tabled)]
    struct Row {
        #[tabled(rename = "ADDRESS")]
        address: String,
        #[tabled(rename = "MONIKER")]
        moniker: String,
        #[tabled(rename = "TYPE")]
        kind: String,
        #[tabled(rename = "LOCATION")]
        location: String,
        #[tabled(rename = "PEERS")]
        peers: String,
        #[tabled(rename = "LATENCY")]
        latency: String,
    }

    let rows: Vec<Row> = nodes
        .iter()
        .map(|n| match &n.info {
            Some(info) => Row {
                address: truncate(&n.address, 24),
                moniker: info.moniker.clone(),
                kind: info
                    .node_type()
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                location: format!("{}, {}", info.location.city, info.location.country),
                peers: info.peers.to_string(),
                latency: n
                    .latency_ms
                    .map(|ms| format!("{}ms", ms))
                    .unwrap_or_else(|| "-".to_string()),
            },
            None => Row {
                address: truncate(&n.address, 24),
                moniker: "-".to_string(),
                kind: "-".to_string(),
                location: n.error.clone().unwrap_or_else(|| "unreachable".to_string()),
                peers: "-".to_string(),
                latency: "-".to_string(),
            },
        })
        .collect();

    Table::new(rows)
        .with(Style::rounded())
        .with(Width::wrap(120))
        .to_string()
}

/// Truncate a string with ellipsis if too long
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix
///
/// Goes to stderr.
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow to stderr
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}
