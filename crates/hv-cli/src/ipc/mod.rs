//! HTTP clients for the local daemons
//!
//! Each daemon publishes its base URL in `url.txt` inside its home
//! directory. The clients read that file on construction and POST JSON
//! bodies to the documented routes.

mod client;

pub use client::{CallError, DaemonClient, KeyringClient, ServiceClient};

pub use hv_core::ipc::{
    AddKeyRequest, ConnectRequest, ConnectionState, FailureInfo, KeyInfo, KeyringAuth,
    SignResponse, StatusResponse,
};
