//! Shared fixtures for daemon integration tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::Notify;

use hv_core::config::DaemonConfig;
use hv_core::traits::{
    Keyring, KeyringAccess, Ledger, NewKey, Node, Session, SessionMsg, SignedTx, TxResponse,
};
use hv_core::{AccAddress, BackendError, KeyringBackend, LedgerError, NodeAddress};
use hv_daemon::backend::{CommandOutput, CommandRunner, Platform};
use hv_daemon::keyring::{generate_mnemonic, FileKeyring};
use hv_daemon::ConnectionOrchestrator;
use hv_daemon::Credentials;
use hv_protocol::{NodeType, SessionId};

pub const KEY_NAME: &str = "alice";

/// First session id the memory ledger hands out
pub const FIRST_SESSION: u64 = 100;

pub fn node_address() -> NodeAddress {
    NodeAddress::from_bytes(&[7; 20])
}

pub fn other_node_address() -> NodeAddress {
    NodeAddress::from_bytes(&[8; 20])
}

/// Scenario A payload
pub fn wireguard_payload() -> Vec<u8> {
    let mut payload = Vec::with_capacity(58);
    payload.extend_from_slice(&Ipv4Addr::new(10, 8, 0, 2).octets());
    payload.extend_from_slice(&"fd00::2".parse::<Ipv6Addr>().unwrap().octets());
    payload.extend_from_slice(&Ipv4Addr::new(203, 0, 113, 5).octets());
    payload.extend_from_slice(&51820u16.to_be_bytes());
    payload.extend_from_slice(&[0u8; 32]);
    payload
}

/// Scenario B payload
pub fn v2ray_payload() -> Vec<u8> {
    let mut payload = Vec::with_capacity(7);
    payload.extend_from_slice(&Ipv4Addr::new(203, 0, 113, 9).octets());
    payload.extend_from_slice(&8443u16.to_be_bytes());
    payload.push(0x03);
    payload
}

/// Pauses node lookups until released
#[derive(Clone, Default)]
pub struct Gate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

/// In-memory ledger that makes started sessions visible immediately
#[derive(Default)]
pub struct MemoryLedger {
    pub nodes: Mutex<HashMap<NodeAddress, Node>>,
    pub sessions: Mutex<HashMap<AccAddress, Session>>,
    pub txs: Mutex<Vec<SignedTx>>,
    pub next_id: AtomicU64,
    pub fail_start: AtomicBool,
    /// Accept Start transactions without ever listing the new session
    pub hide_started: AtomicBool,
    pub session_lookups: AtomicUsize,
    pub gate: Mutex<Option<Gate>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(FIRST_SESSION),
            ..Self::default()
        }
    }

    pub fn add_node(&self, address: NodeAddress, remote_url: &str) {
        self.nodes.lock().unwrap().insert(
            address.clone(),
            Node {
                address,
                remote_url: remote_url.to_string(),
                status: "active".into(),
                node_type: None,
            },
        );
    }

    pub fn add_session(&self, account: AccAddress, id: u64, node: NodeAddress) {
        self.sessions.lock().unwrap().insert(
            account.clone(),
            Session {
                id: SessionId::new(id),
                subscription: 1,
                node,
                address: account,
                status: "active".into(),
            },
        );
    }

    pub fn messages(&self) -> Vec<SessionMsg> {
        self.txs
            .lock()
            .unwrap()
            .iter()
            .flat_map(|tx| tx.body.messages.clone())
            .collect()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn account_session(&self, account: &AccAddress) -> Result<Option<Session>, LedgerError> {
        self.session_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.sessions.lock().unwrap().get(account).cloned())
    }

    async fn node(&self, address: &NodeAddress) -> Result<Node, LedgerError> {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        self.nodes
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .ok_or_else(|| LedgerError::NodeNotFound(address.to_string()))
    }

    async fn nodes(&self, _status: &str, limit: u32) -> Result<Vec<Node>, LedgerError> {
        Ok(self
            .nodes
            .lock()
            .unwrap()
            .values()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn broadcast(&self, tx: SignedTx) -> Result<TxResponse, LedgerError> {
        assert!(!tx.signature.is_empty(), "transactions must be signed");

        for message in &tx.body.messages {
            match message {
                SessionMsg::Start { from, id, node } => {
                    if self.fail_start.load(Ordering::SeqCst) {
                        return Err(LedgerError::Broadcast {
                            txhash: "FAILED".into(),
                            code: 5,
                            log: "insufficient funds".into(),
                        });
                    }
                    let session = self.next_id.fetch_add(1, Ordering::SeqCst);
                    if self.hide_started.load(Ordering::SeqCst) {
                        continue;
                    }
                    let mut sessions = self.sessions.lock().unwrap();
                    sessions.insert(
                        from.clone(),
                        Session {
                            id: SessionId::new(session),
                            subscription: *id,
                            node: node.clone(),
                            address: from.clone(),
                            status: "active".into(),
                        },
                    );
                }
                SessionMsg::End { from, id, .. } => {
                    let mut sessions = self.sessions.lock().unwrap();
                    if sessions.get(from).map(|s| s.id) == Some(*id) {
                        sessions.remove(from);
                    }
                }
            }
        }

        let mut txs = self.txs.lock().unwrap();
        txs.push(tx);
        Ok(TxResponse {
            txhash: format!("TX{}", txs.len()),
            code: 0,
            raw_log: String::new(),
        })
    }
}

/// Command runner emulating `wg`, `wg-quick` and a relay process
#[derive(Default)]
pub struct FakeSystem {
    pub calls: Mutex<Vec<String>>,
    pub wireguard_up: AtomicBool,
    pub fail_up: AtomicBool,
    pub alive: Mutex<HashSet<u32>>,
    pub killed: Mutex<Vec<u32>>,
}

impl FakeSystem {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called(&self, prefix: &str) -> bool {
        self.calls().iter().any(|c| c.starts_with(prefix))
    }
}

fn output(success: bool, stdout: &str, stderr: &str) -> CommandOutput {
    CommandOutput {
        success,
        status: if success { "exit status: 0" } else { "exit status: 1" }.into(),
        stdout: stdout.into(),
        stderr: stderr.into(),
    }
}

#[async_trait]
impl CommandRunner for FakeSystem {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, BackendError> {
        let line = format!("{} {}", program, args.join(" "));
        self.calls.lock().unwrap().push(line);

        let up = self.wireguard_up.load(Ordering::SeqCst);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        Ok(match (program, args.as_slice()) {
            ("wg-quick", ["up", ..]) if self.fail_up.load(Ordering::SeqCst) => {
                output(false, "", "RTNETLINK answers: Operation not permitted")
            }
            ("wg-quick", ["up", ..]) => {
                self.wireguard_up.store(true, Ordering::SeqCst);
                output(true, "", "")
            }
            ("wg-quick", ["down", target]) => {
                // A bare name is looked up under /etc/wireguard
                let conf = if target.contains('/') {
                    target.to_string()
                } else {
                    format!("/etc/wireguard/{}.conf", target)
                };
                let conf = Path::new(&conf);
                let iface = conf
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                if !conf.exists() {
                    output(false, "", &format!("wg-quick: `{}' does not exist", conf.display()))
                } else if up {
                    self.wireguard_up.store(false, Ordering::SeqCst);
                    output(true, "", &format!("[#] ip link delete dev {}", iface))
                } else {
                    output(
                        false,
                        "",
                        &format!("wg-quick: `{}' is not a WireGuard interface", iface),
                    )
                }
            }
            ("wg", ["show", _, "transfer"]) if up => output(true, "cGVlcg==\t1000\t2500\n", ""),
            ("wg", ["show", iface]) if up => output(true, &format!("interface: {}\n", iface), ""),
            ("wg", _) => output(false, "", "Unable to access interface: No such device"),
            _ => output(false, "", "command not found"),
        })
    }

    async fn spawn(&self, program: &str, args: &[String]) -> Result<u32, BackendError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("spawn {} {}", program, args.join(" ")));
        self.alive.lock().unwrap().insert(4242);
        Ok(4242)
    }

    async fn is_alive(&self, pid: u32, _name: &str) -> bool {
        self.alive.lock().unwrap().contains(&pid)
    }

    async fn kill(&self, pid: u32) -> Result<(), BackendError> {
        self.alive.lock().unwrap().remove(&pid);
        self.killed.lock().unwrap().push(pid);
        Ok(())
    }
}

/// A node's remote API
pub struct FakeNode {
    pub url: String,
    pub handshakes: Arc<AtomicUsize>,
}

pub async fn spawn_node(node_type: NodeType, payload: Vec<u8>) -> FakeNode {
    let handshakes = Arc::new(AtomicUsize::new(0));
    let counter = handshakes.clone();
    let result = STANDARD.encode(&payload);
    let kind = node_type.as_u64();

    let router = Router::new()
        .route(
            "/status",
            get(move || async move {
                Json(json!({"success": true, "result": {"moniker": "fake", "type": kind}}))
            }),
        )
        .route(
            "/accounts/:account/sessions/:id",
            post(move |Json(body): Json<serde_json::Value>| {
                let counter = counter.clone();
                let result = result.clone();
                async move {
                    assert!(body["key"].as_str().is_some_and(|k| !k.is_empty()));
                    assert!(body["signature"].as_str().is_some_and(|s| !s.is_empty()));
                    counter.fetch_add(1, Ordering::SeqCst);
                    Json(json!({"success": true, "result": result}))
                }
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

    FakeNode { url, handshakes }
}

/// Everything one orchestrator test needs
pub struct Harness {
    pub dir: TempDir,
    pub ledger: Arc<MemoryLedger>,
    pub system: Arc<FakeSystem>,
    pub keyring: Arc<FileKeyring>,
    pub account: AccAddress,
    pub orchestrator: Arc<ConnectionOrchestrator>,
}

pub fn test_config(dir: &TempDir) -> DaemonConfig {
    let mut config = DaemonConfig::default().with_home(dir.path());
    config.listen_on = "127.0.0.1:0".into();
    config.keyring.listen_on = "127.0.0.1:0".into();
    config.ledger.poll_attempts = 3;
    config.ledger.poll_interval = Duration::from_millis(10);
    config.handshake.timeout = Duration::from_secs(5);
    config
}

pub fn access() -> KeyringAccess {
    KeyringAccess::new(KeyringBackend::Test, "")
}

pub fn credentials() -> Credentials {
    Credentials {
        access: access(),
        from: KEY_NAME.into(),
        rating: 0,
        resolvers: vec!["1.1.1.1".parse().unwrap()],
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::with_ledger(Arc::new(MemoryLedger::new()))
    }

    pub fn with_ledger(ledger: Arc<MemoryLedger>) -> Self {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let system = Arc::new(FakeSystem::default());
        let keyring = Arc::new(FileKeyring::new(config.keyring.home.clone()));

        let info = keyring
            .add(
                &access(),
                NewKey {
                    name: KEY_NAME.into(),
                    mnemonic: generate_mnemonic().unwrap(),
                    bip39_password: String::new(),
                    coin_type: 118,
                    account: 0,
                    index: 0,
                },
            )
            .unwrap();
        let account: AccAddress = info.address.parse().unwrap();

        let orchestrator = ConnectionOrchestrator::new(
            config,
            ledger.clone(),
            keyring.clone(),
            system.clone(),
        )
        .unwrap()
        .with_platform(Platform::Linux);

        Self {
            dir,
            ledger,
            system,
            keyring,
            account,
            orchestrator: Arc::new(orchestrator),
        }
    }

    /// Register a fake node on the ledger
    pub async fn node(&self, node_type: NodeType, payload: Vec<u8>) -> FakeNode {
        let node = spawn_node(node_type, payload).await;
        self.ledger.add_node(node_address(), &node.url);
        node
    }
}
