//! Core error types for hubvpn
//!
//! Each collaborator gets its own error enum; [`ClientError`] gathers them for
//! the orchestrator and assigns the numeric code the local daemons report.

use std::path::PathBuf;

use hv_protocol::{HandshakeError, SessionId};
use thiserror::Error;

/// Top-level error type for connect/disconnect/status flows
#[derive(Error, Debug)]
pub enum ClientError {
    /// Request body could not be parsed
    #[error("Malformed request: {0}")]
    Malformed(String),

    /// Request fields failed validation
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Status file could not be read or written
    #[error("Status error: {0}")]
    Status(#[from] StatusError),

    /// A tunnel believed active is actually up
    #[error("Service is already running on interface {iface}")]
    AlreadyConnected { iface: String },

    /// Another connect or disconnect is in flight
    #[error("Another connect or disconnect is in progress")]
    Busy,

    /// Key management failure
    #[error("Keyring error: {0}")]
    Keyring(#[from] KeyringError),

    /// Ledger query or broadcast failure
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Node handshake failure
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Handshake payload could not be decoded
    #[error("Codec error: {0}")]
    Codec(#[from] HandshakeError),

    /// Local tunnel failure
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// A session was started on the ledger but the tunnel is not tracked
    #[error("Session {session_id} started but {stage} failed: {message}")]
    PartialFailure {
        session_id: SessionId,
        stage: String,
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Stable numeric code reported in response envelopes
    pub fn code(&self) -> u32 {
        match self {
            ClientError::Malformed(_) => 1001,
            ClientError::Validation(_) => 1002,
            ClientError::Status(_) => 1003,
            ClientError::AlreadyConnected { .. } => 1004,
            ClientError::Busy => 1005,
            ClientError::Keyring(KeyringError::NotFound(_)) => 1007,
            ClientError::Keyring(KeyringError::AlreadyExists(_)) => 1008,
            ClientError::Keyring(_) => 1006,
            ClientError::Ledger(LedgerError::SessionEndedWithoutStart { .. }) => 1010,
            ClientError::Ledger(_) => 1009,
            ClientError::Remote(_) => 1011,
            ClientError::Codec(_) => 1012,
            ClientError::Backend(_) => 1013,
            ClientError::PartialFailure { .. } => 1014,
            ClientError::Config(_) => 1015,
            ClientError::Io(_) => 1016,
        }
    }

    /// HTTP status code used by the local daemons
    pub fn http_status(&self) -> u16 {
        match self {
            ClientError::Malformed(_) | ClientError::Validation(_) => 400,
            ClientError::Keyring(KeyringError::WrongPassword) => 401,
            ClientError::Keyring(KeyringError::NotFound(_)) => 404,
            ClientError::AlreadyConnected { .. }
            | ClientError::Busy
            | ClientError::Keyring(KeyringError::AlreadyExists(_)) => 409,
            ClientError::Ledger(_) | ClientError::Remote(_) | ClientError::Codec(_) => 502,
            _ => 500,
        }
    }
}

/// A request field failed validation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Status store errors
#[derive(Error, Debug)]
pub enum StatusError {
    /// Reading or writing the status file failed
    #[error("Status file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Status file contents are not valid JSON
    #[error("Status file {path:?} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Backend configuration blob could not be encoded or decoded
    #[error("Tunnel configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Node handshake errors
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Endpoint unreachable, TLS failure or timeout
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Node answered with a non-success HTTP status and no envelope
    #[error("Node returned HTTP {0}")]
    Status(u16),

    /// Node returned an error envelope
    #[error("Node rejected request ({code}): {message}")]
    Envelope { code: u32, message: String },

    /// Node returned success without a result
    #[error("Node response has no result")]
    MissingResult,

    /// Result was not valid base64
    #[error("Node result is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Ledger client errors
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Ledger endpoint unreachable or returned garbage
    #[error("Ledger request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// Transaction was rejected
    #[error("Transaction {txhash} failed with code {code}: {log}")]
    Broadcast {
        txhash: String,
        code: u32,
        log: String,
    },

    /// No active session became visible after starting one
    #[error("Active session does not exist for subscription {subscription}")]
    SessionNotFound { subscription: u64 },

    /// Node is not registered on the ledger
    #[error("Node {0} not found")]
    NodeNotFound(String),

    /// The previous session was ended but the new one was not started
    #[error("Session {ended} was ended but starting a new session failed: {message}")]
    SessionEndedWithoutStart { ended: SessionId, message: String },

    /// Ledger response did not have the expected shape
    #[error("Unexpected ledger response: {0}")]
    Decode(String),
}

/// Local tunnel errors
#[derive(Error, Debug)]
pub enum BackendError {
    /// Writing or removing the native config failed
    #[error("Failed to write {path:?}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A helper command exited unsuccessfully
    #[error("{program} exited with {status}: {stderr}")]
    Command {
        program: String,
        status: String,
        stderr: String,
    },

    /// A helper command could not be started
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Local filesystem or socket failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stopping a tunnel process failed
    #[error("Failed to stop process {pid}: {message}")]
    Kill { pid: u32, message: String },

    /// No free local port
    #[error("No free port available: {0}")]
    Port(std::io::Error),

    /// Stored configuration does not match the backend type
    #[error("Invalid tunnel configuration: {0}")]
    Invalid(String),
}

/// Key management errors
#[derive(Error, Debug)]
pub enum KeyringError {
    #[error("Key {0} not found")]
    NotFound(String),

    #[error("Key with name {0} already exists")]
    AlreadyExists(String),

    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("Wrong keyring password")]
    WrongPassword,

    #[error("Keyring storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Keyring record is corrupt: {0}")]
    Corrupt(String),

    #[error("Key derivation failed: {0}")]
    Crypto(String),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
