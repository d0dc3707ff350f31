//! hubvpn: command-line front-end for the dVPN client
//!
//! Runs the service and keyring daemons in the foreground and drives them
//! over their local HTTP interfaces.

pub mod commands;
pub mod ipc;
pub mod output;
