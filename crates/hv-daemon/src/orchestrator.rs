//! Connection lifecycle orchestrator
//!
//! The orchestrator is the only writer of the status file. It sequences one
//! connect as:
//!
//! 1. reconcile the stored status against the backend's liveness probe
//! 2. end the account's active session, if any
//! 3. start a session on the target node and poll until it is visible
//! 4. sign the session id and run the node handshake
//! 5. decode the handshake into a tunnel configuration
//! 6. PreUp, Up and PostUp on the backend
//! 7. persist the status
//!
//! # Concurrency model
//!
//! One daemon owns a home directory (enforced by the PID file locked at
//! start-up). Inside that daemon, connect and disconnect take the lifecycle
//! mutex with `try_lock`: a second request while one is in flight fails
//! with `Busy` instead of queueing behind a ledger broadcast.
//!
//! # Partial failures
//!
//! Ending the old session and starting the new one are separate
//! transactions. Any failure after a ledger transaction has been accepted
//! is recorded in `last_failure` and reported by [`ConnectionOrchestrator::status`]
//! until the next successful connect or disconnect. Nothing is compensated
//! automatically.

use std::io;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use tokio::sync::Mutex;
use uuid::Uuid;
use x25519_dalek::{PublicKey, StaticSecret};

use hv_core::config::DaemonConfig;
use hv_core::ipc::{ConnectionState, FailureInfo, KeyInfo, SignResponse, StatusResponse};
use hv_core::traits::{sign_bytes, Keyring, KeyringAccess, Ledger, Session, SessionMsg, SignedTx, UnsignedTx};
use hv_core::tunnel::{V2RayConfig, WireGuardConfig, WireGuardPeer};
use hv_core::units::current_time_secs;
use hv_core::{
    AccAddress, BackendKind, ClientError, KeyringError, LedgerError, NodeAddress, Status,
    StatusStore, TunnelConfig,
};
use hv_protocol::{Handshake, HandshakeError, HandshakeRequest, NodeType, SessionId};

use crate::backend::{
    free_tcp_port, free_udp_port, CommandRunner, Platform, Tunnel, TunnelBackend,
};
use crate::backoff::PollSchedule;
use crate::remote::NodeClient;

/// Who is connecting and how
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Keyring backend and password
    pub access: KeyringAccess,
    /// Key name that owns the account
    pub from: String,
    /// Rating for the session being ended
    pub rating: u64,
    /// DNS resolvers added after the default one
    pub resolvers: Vec<IpAddr>,
}

/// Locally generated identity submitted in the handshake
enum Identity {
    WireGuard { secret: StaticSecret },
    V2Ray { id: [u8; 16] },
}

impl Identity {
    fn generate(node_type: NodeType) -> Self {
        match node_type {
            NodeType::WireGuard => Identity::WireGuard {
                secret: StaticSecret::random_from_rng(OsRng),
            },
            NodeType::V2Ray => {
                let mut id = [0u8; 16];
                OsRng.fill_bytes(&mut id);
                Identity::V2Ray { id }
            }
        }
    }

    /// Base64 key sent to the node
    fn key(&self) -> String {
        match self {
            Identity::WireGuard { secret } => STANDARD.encode(PublicKey::from(secret).as_bytes()),
            Identity::V2Ray { id } => STANDARD.encode(id),
        }
    }
}

/// Drives connect, disconnect and status for one home directory
pub struct ConnectionOrchestrator {
    home: PathBuf,
    config: DaemonConfig,
    store: StatusStore,
    ledger: Arc<dyn Ledger>,
    keyring: Arc<dyn Keyring>,
    nodes: NodeClient,
    runner: Arc<dyn CommandRunner>,
    platform: Platform,
    lifecycle: Mutex<()>,
    state: StdMutex<ConnectionState>,
    last_failure: StdMutex<Option<FailureInfo>>,
}

impl ConnectionOrchestrator {
    pub fn new(
        config: DaemonConfig,
        ledger: Arc<dyn Ledger>,
        keyring: Arc<dyn Keyring>,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self, ClientError> {
        let nodes = NodeClient::new(&config.handshake)?;
        let store = StatusStore::in_home(&config.home);

        let initial = match store.load() {
            Ok(status) if !status.is_empty() => ConnectionState::Connected,
            Ok(_) => ConnectionState::Disconnected,
            Err(e) => {
                tracing::warn!("Ignoring unreadable status at start-up: {}", e);
                ConnectionState::Disconnected
            }
        };

        Ok(Self {
            home: config.home.clone(),
            config,
            store,
            ledger,
            keyring,
            nodes,
            runner,
            platform: Platform::current(),
            lifecycle: Mutex::new(()),
            state: StdMutex::new(initial),
            last_failure: StdMutex::new(None),
        })
    }

    /// Override the platform strategy
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn store(&self) -> &StatusStore {
        &self.store
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.state.lock().map(|s| *s).unwrap_or_default()
    }

    /// Most recent unrecovered partial failure
    pub fn last_failure(&self) -> Option<FailureInfo> {
        self.last_failure.lock().ok().and_then(|f| f.clone())
    }

    fn set_state(&self, state: ConnectionState) {
        if let Ok(mut current) = self.state.lock() {
            if *current != state {
                tracing::info!("Connection state: {} -> {}", *current, state);
                *current = state;
            }
        }
    }

    fn set_failure(&self, failure: Option<FailureInfo>) {
        if let Ok(mut slot) = self.last_failure.lock() {
            *slot = failure;
        }
    }

    fn record_failure(&self, session: Option<SessionId>, stage: &str, err: &ClientError) {
        tracing::error!(
            "Connect failed at {} after a ledger transaction (session {:?}): {}",
            stage,
            session.map(|s| s.as_u64()),
            err
        );
        self.set_failure(Some(FailureInfo {
            code: err.code(),
            session_id: session.map(|s| s.as_u64()),
            stage: stage.to_string(),
            message: err.to_string(),
            at: current_time_secs(),
        }));
    }

    /// Settle the state from the status file after a lifecycle operation
    fn settle_state(&self) {
        let state = match self.store.load() {
            Ok(status) if !status.is_empty() => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        };
        self.set_state(state);
    }

    async fn with_keyring<T, F>(&self, f: F) -> Result<T, ClientError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Keyring) -> Result<T, KeyringError> + Send + 'static,
    {
        let keyring = Arc::clone(&self.keyring);
        let result = tokio::task::spawn_blocking(move || f(keyring.as_ref()))
            .await
            .map_err(|e| ClientError::Io(io::Error::new(io::ErrorKind::Other, e)))?;
        Ok(result?)
    }

    async fn sign(&self, creds: &Credentials, bytes: Vec<u8>) -> Result<SignResponse, ClientError> {
        let access = creds.access.clone();
        let from = creds.from.clone();
        self.with_keyring(move |k| k.sign(&access, &from, &bytes)).await
    }

    /// Rebuild the backend recorded in a status
    fn tunnel_for(&self, status: &Status) -> Option<Tunnel> {
        let config = match status.tunnel_config() {
            Ok(Some(config)) => Some(config),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Stored tunnel configuration is unreadable: {}", e);
                None
            }
        };

        let config = config.or_else(|| match (status.kind, status.pid) {
            (BackendKind::WireGuard, _) => Some(TunnelConfig::WireGuard(
                WireGuardConfig::for_interface(status.iface.clone()),
            )),
            (BackendKind::V2Ray, Some(pid)) => {
                Some(TunnelConfig::V2Ray(V2RayConfig::for_process(pid)))
            }
            (BackendKind::None, _)
                if !status.iface.is_empty() && status.iface != hv_core::tunnel::V2RAY_HANDLE =>
            {
                Some(TunnelConfig::WireGuard(WireGuardConfig::for_interface(
                    status.iface.clone(),
                )))
            }
            _ => {
                tracing::warn!(
                    "No way to reach tunnel {:?} for session {} (pid {:?})",
                    status.iface,
                    status.id,
                    status.pid
                );
                None
            }
        })?;

        Some(Tunnel::new(
            config,
            &self.home,
            self.platform,
            Arc::clone(&self.runner),
        ))
    }

    /// Report the believed and actual connection state
    pub async fn status(&self) -> Result<StatusResponse, ClientError> {
        let status = self.store.load()?;
        let mut response = StatusResponse {
            state: self.state(),
            id: status.id,
            from: status.from.clone(),
            to: status.to.clone(),
            kind: status.kind.into(),
            iface: status.iface.clone(),
            last_failure: self.last_failure(),
            ..StatusResponse::default()
        };

        if let Some(tunnel) = self.tunnel_for(&status) {
            response.is_up = tunnel.is_up().await;
            if response.is_up {
                let (upload, download) = tunnel.transfer().await;
                response.upload = upload;
                response.download = download;
            }
        }
        Ok(response)
    }

    /// Establish a session with `to` and bring up the tunnel
    pub async fn connect(
        &self,
        id: u64,
        to: &NodeAddress,
        creds: &Credentials,
    ) -> Result<(), ClientError> {
        let _guard = self.lifecycle.try_lock().map_err(|_| ClientError::Busy)?;
        self.set_state(ConnectionState::Connecting);

        let result = self.connect_locked(id, to, creds).await;
        if result.is_ok() {
            self.set_failure(None);
        }
        self.settle_state();
        result
    }

    async fn connect_locked(
        &self,
        id: u64,
        to: &NodeAddress,
        creds: &Credentials,
    ) -> Result<(), ClientError> {
        if id == 0 {
            return Err(hv_core::ValidationError::new("id cannot be zero").into());
        }

        // Never tear down a live tunnel as a side effect of connecting
        let status = self.store.load()?;
        if !status.is_empty() {
            if let Some(tunnel) = self.tunnel_for(&status) {
                if tunnel.is_up().await {
                    return Err(ClientError::AlreadyConnected {
                        iface: status.iface,
                    });
                }
            }
            tracing::warn!(
                "Clearing stale status for session {} ({} is not up)",
                status.id,
                status.iface
            );
            self.store.clear()?;
        }

        let key = self.key_info(creds).await?;
        let account: AccAddress = key
            .address
            .parse()
            .map_err(|e: hv_core::ValidationError| KeyringError::Corrupt(e.0))?;

        let node = self.ledger.node(to).await?;
        let node_type = match self.nodes.info(&node.remote_url).await {
            Ok(info) => info
                .node_type()
                .ok_or(HandshakeError::UnknownNodeType(info.kind))?,
            Err(e) => match node.node_type {
                Some(node_type) => {
                    tracing::warn!("Node status unavailable ({}), using ledger type", e);
                    node_type
                }
                None => return Err(e.into()),
            },
        };
        tracing::info!("Connecting to {} node {} via {}", node_type, to, node.remote_url);

        let session = self.open_session(&account, id, to, creds).await?;
        let stage = |s: &str, e: ClientError| {
            self.record_failure(Some(session.id), s, &e);
            e
        };

        let identity = Identity::generate(node_type);
        let signature = self
            .sign(creds, session.id.signing_bytes().to_vec())
            .await
            .map_err(|e| stage("sign", e))?;
        let request = HandshakeRequest {
            key: identity.key(),
            signature: signature.signature,
        };

        let payload = self
            .nodes
            .handshake(&node.remote_url, &account, session.id, &request)
            .await
            .map_err(|e| stage("handshake", e.into()))?;
        let handshake =
            Handshake::decode(node_type, &payload).map_err(|e| stage("handshake", e.into()))?;

        let config = self
            .tunnel_config(identity, handshake, &creds.resolvers)
            .map_err(|e| stage("configure", e))?;
        let mut tunnel = Tunnel::new(config, &self.home, self.platform, Arc::clone(&self.runner));

        if let Err(e) = tunnel.pre_up().await {
            let _ = tunnel.post_down().await;
            return Err(stage("pre-up", e.into()));
        }
        let activated = match tunnel.up().await {
            Ok(()) => tunnel.post_up().await,
            Err(e) => Err(e),
        };
        if let Err(e) = activated {
            self.teardown(&tunnel).await;
            return Err(stage("up", e.into()));
        }

        let saved = Status::connected(
            session.id.as_u64(),
            account.to_string(),
            to.to_string(),
            &tunnel.tunnel_config(),
        )
        .and_then(|status| self.store.save(&status));
        if let Err(e) = saved {
            self.teardown(&tunnel).await;
            let err = ClientError::PartialFailure {
                session_id: session.id,
                stage: "save status".to_string(),
                message: e.to_string(),
            };
            self.record_failure(Some(session.id), "save status", &err);
            return Err(err);
        }

        tracing::info!(
            "Connected: session {} on {} via {}",
            session.id,
            to,
            tunnel.handle()
        );
        Ok(())
    }

    async fn key_info(&self, creds: &Credentials) -> Result<KeyInfo, ClientError> {
        let access = creds.access.clone();
        let from = creds.from.clone();
        self.with_keyring(move |k| k.get(&access, &from)).await
    }

    /// Broadcast a session message signed by the account
    async fn broadcast(
        &self,
        creds: &Credentials,
        message: SessionMsg,
    ) -> Result<(), ClientError> {
        let body = UnsignedTx {
            chain_id: self.config.ledger.chain_id.clone(),
            messages: vec![message],
            memo: self.config.ledger.memo.clone(),
            gas: self.config.ledger.gas,
            fees: self.config.ledger.fees.clone(),
        };
        let bytes = sign_bytes(&body).map_err(|e| LedgerError::Decode(e.to_string()))?;
        let signed = self.sign(creds, bytes).await?;

        self.ledger
            .broadcast(SignedTx {
                body,
                public_key: signed.public_key,
                signature: signed.signature,
            })
            .await?;
        Ok(())
    }

    /// End any active session, start a new one and wait until it is visible
    async fn open_session(
        &self,
        account: &AccAddress,
        id: u64,
        to: &NodeAddress,
        creds: &Credentials,
    ) -> Result<Session, ClientError> {
        let ended = match self.ledger.account_session(account).await? {
            Some(active) => {
                tracing::info!("Ending active session {} on {}", active.id, active.node);
                self.broadcast(
                    creds,
                    SessionMsg::End {
                        from: account.clone(),
                        id: active.id,
                        rating: creds.rating,
                    },
                )
                .await?;
                Some(active.id)
            }
            None => None,
        };

        let started = self
            .broadcast(
                creds,
                SessionMsg::Start {
                    from: account.clone(),
                    id,
                    node: to.clone(),
                },
            )
            .await;
        if let Err(e) = started {
            return Err(match ended {
                Some(ended) => {
                    let err: ClientError = LedgerError::SessionEndedWithoutStart {
                        ended,
                        message: e.to_string(),
                    }
                    .into();
                    self.record_failure(Some(ended), "start session", &err);
                    err
                }
                None => e,
            });
        }

        let mut pauses = PollSchedule::for_sessions(&self.config.ledger);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.ledger.account_session(account).await {
                Ok(Some(session)) if session.node == *to && Some(session.id) != ended => {
                    tracing::info!("Session {} is active", session.id);
                    return Ok(session);
                }
                Ok(_) => {}
                Err(e) => tracing::debug!("Session lookup attempt {} failed: {}", attempt, e),
            }
            match pauses.next() {
                Some(pause) => tokio::time::sleep(pause).await,
                None => break,
            }
        }

        let err: ClientError = LedgerError::SessionNotFound { subscription: id }.into();
        // A session ended on the way here is gone either way
        self.record_failure(ended, "session lookup", &err);
        Err(err)
    }

    fn tunnel_config(
        &self,
        identity: Identity,
        handshake: Handshake,
        resolvers: &[IpAddr],
    ) -> Result<TunnelConfig, ClientError> {
        match (identity, handshake) {
            (Identity::WireGuard { secret }, Handshake::WireGuard(h)) => {
                let mut dns = vec![self.config.tunnel.default_resolver];
                for resolver in resolvers {
                    if !dns.contains(resolver) {
                        dns.push(*resolver);
                    }
                }
                Ok(TunnelConfig::WireGuard(WireGuardConfig {
                    name: self.config.tunnel.wireguard_interface.clone(),
                    private_key: STANDARD.encode(secret.to_bytes()),
                    ipv4: h.ipv4,
                    ipv6: h.ipv6,
                    listen_port: free_udp_port()?,
                    dns,
                    peer: WireGuardPeer {
                        public_key: STANDARD.encode(h.peer_public_key),
                        endpoint: h.endpoint,
                        persistent_keepalive: self.config.tunnel.keepalive,
                    },
                }))
            }
            (Identity::V2Ray { id }, Handshake::V2Ray(h)) => {
                let api_port = free_tcp_port()?;
                let mut proxy_port = free_tcp_port()?;
                while proxy_port == api_port {
                    proxy_port = free_tcp_port()?;
                }
                Ok(TunnelConfig::V2Ray(V2RayConfig {
                    api_port,
                    proxy_port,
                    address: h.address,
                    port: h.port,
                    id: Uuid::from_bytes(id),
                    transport: h.transport,
                    pid: None,
                }))
            }
            (_, handshake) => Err(HandshakeError::UnknownNodeType(
                handshake.node_type().as_u64(),
            )
            .into()),
        }
    }

    /// Best-effort teardown after a failed connect
    async fn teardown(&self, tunnel: &Tunnel) {
        if let Err(e) = tunnel.deactivate().await {
            tracing::warn!("Teardown of {} failed: {}", tunnel.handle(), e);
        }
    }

    /// Tear down the recorded tunnel and clear the status
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        let _guard = self.lifecycle.try_lock().map_err(|_| ClientError::Busy)?;
        self.set_state(ConnectionState::Disconnecting);

        let result = self.disconnect_locked().await;
        if result.is_ok() {
            self.set_failure(None);
        }
        self.settle_state();
        result
    }

    async fn disconnect_locked(&self) -> Result<(), ClientError> {
        let status = self.store.load()?;
        if status.is_empty() {
            tracing::debug!("Nothing to disconnect");
            return Ok(());
        }

        match self.tunnel_for(&status) {
            Some(tunnel) if tunnel.is_up().await => {
                tunnel.deactivate().await?;
                tracing::info!("Disconnected session {} ({})", status.id, status.iface);
            }
            Some(tunnel) => {
                tracing::warn!(
                    "{} is not up, clearing stale status for session {}",
                    status.iface,
                    status.id
                );
                if let Err(e) = tunnel.post_down().await {
                    tracing::debug!("Leftover config cleanup failed: {}", e);
                }
            }
            None => tracing::warn!(
                "Status for session {} has no usable tunnel record ({}), clearing it",
                status.id,
                status.iface
            ),
        }

        self.store.clear()?;
        Ok(())
    }
}
