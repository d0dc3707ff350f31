//! CLI integration tests
//!
//! Tests the hubvpn CLI using assert_cmd. Commands that need a daemon run
//! against gateways served in-process on ephemeral ports.

use std::path::Path;
use std::process::Output;
use std::time::Duration;

use assert_cmd::assert::{Assert, OutputAssertExt};
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use hv_core::config::{self, DaemonConfig};
use hv_core::discovery;
use hv_daemon::gateway::{self, RunOptions};
use hv_daemon::DaemonState;

fn hubvpn(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("hubvpn")
        .expect("Failed to locate hubvpn binary - ensure it's built before running tests");
    cmd.env_remove("HUBVPN_KEYRING_PASSWORD")
        .env("HUBVPN_HOME", home);
    cmd
}

#[test]
fn test_cli_help() {
    let dir = TempDir::new().unwrap();
    hubvpn(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("hubvpn"))
        .stdout(predicate::str::contains("dVPN client"));
}

#[test]
fn test_cli_version() {
    let dir = TempDir::new().unwrap();
    hubvpn(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("hubvpn"));
}

#[test]
fn test_cli_connect_help() {
    let dir = TempDir::new().unwrap();
    hubvpn(dir.path())
        .args(["connect", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--resolver"))
        .stdout(predicate::str::contains("--rating"));
}

#[test]
fn test_cli_connect_missing_node() {
    let dir = TempDir::new().unwrap();
    hubvpn(dir.path()).args(["connect", "1"]).assert().failure();
}

#[test]
fn test_cli_unknown_command() {
    let dir = TempDir::new().unwrap();
    hubvpn(dir.path())
        .arg("nonexistent-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_cli_config_show_defaults() {
    // Works without a config file or a daemon
    let dir = TempDir::new().unwrap();
    hubvpn(dir.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("listen_on"))
        .stdout(predicate::str::contains("[ledger]"));
}

#[test]
fn test_cli_config_init_set_get() {
    let dir = TempDir::new().unwrap();
    hubvpn(dir.path()).args(["config", "init"]).assert().success();
    assert!(config::config_path(dir.path()).exists());

    hubvpn(dir.path())
        .args(["config", "set", "nodes.concurrency", "3"])
        .assert()
        .success();
    hubvpn(dir.path())
        .args(["config", "get", "nodes.concurrency"])
        .assert()
        .success()
        .stdout(predicate::str::diff("3\n"));

    hubvpn(dir.path())
        .args(["config", "get", "nodes.nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Key not found"));
}

#[test]
fn test_cli_status_without_daemon() {
    let dir = TempDir::new().unwrap();
    hubvpn(dir.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no daemon is running"))
        .stderr(predicate::str::contains("hubvpn start"));
}

#[test]
fn test_cli_connect_rejects_bad_backend() {
    let dir = TempDir::new().unwrap();
    hubvpn(dir.path())
        .args(["connect", "1", "sentnode1xyz", "--from", "alice", "--backend", "kwallet"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("backend must be one of"));
}

/// Gateways serving a temporary home until dropped
struct Daemon {
    dir: TempDir,
    config: DaemonConfig,
    cancel: CancellationToken,
}

impl Drop for Daemon {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn start_daemon() -> Daemon {
    let dir = TempDir::new().unwrap();
    let mut config = DaemonConfig::default().with_home(dir.path());
    config.listen_on = "127.0.0.1:0".to_string();
    config.keyring.listen_on = "127.0.0.1:0".to_string();
    // Nothing in these tests reaches the ledger
    config.ledger.rpc_address = "http://127.0.0.1:9".to_string();

    let state = DaemonState::new(config.clone()).unwrap();
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move { gateway::run(&state, RunOptions::default(), token).await });

    for home in [&config.home, &config.keyring.home] {
        let path = discovery::url_path(home);
        for _ in 0..100 {
            if discovery::read_url_file(home).is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(path.exists(), "daemon did not publish {:?}", path);
    }

    Daemon { dir, config, cancel }
}

async fn run_cli(home: &Path, args: &[&str]) -> Assert {
    let mut cmd = hubvpn(home);
    cmd.args(args);
    output_of(cmd).await.assert()
}

/// Run a prepared command off the runtime so the in-process daemon keeps serving
async fn output_of(mut cmd: Command) -> Output {
    tokio::task::spawn_blocking(move || cmd.output())
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cli_status_against_daemon() {
    let daemon = start_daemon().await;

    run_cli(daemon.dir.path(), &["status"])
        .await
        .success()
        .stdout(predicate::str::contains("disconnected"));

    run_cli(daemon.dir.path(), &["status", "--json"])
        .await
        .success()
        .stdout(predicate::str::contains("\"state\": \"disconnected\""));

    // Nothing to tear down is still a success
    run_cli(daemon.dir.path(), &["disconnect"])
        .await
        .success()
        .stdout(predicate::str::contains("Disconnected"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cli_key_lifecycle() {
    let daemon = start_daemon().await;
    let home = daemon.dir.path();
    assert!(daemon.config.keyring.home.starts_with(home));

    run_cli(home, &["keys", "add", "bob", "--backend", "test"])
        .await
        .success()
        .stdout(predicate::str::contains("Added key bob"))
        .stdout(predicate::str::contains("sent1"));

    run_cli(home, &["keys", "add", "bob", "--backend", "test"])
        .await
        .failure()
        .stderr(predicate::str::contains("1008"));

    run_cli(home, &["keys", "list", "--backend", "test"])
        .await
        .success()
        .stdout(predicate::str::contains("bob"));

    run_cli(home, &["keys", "delete", "bob", "--backend", "test"])
        .await
        .success();

    run_cli(home, &["keys", "show", "bob", "--backend", "test"])
        .await
        .failure()
        .stderr(predicate::str::contains("1007"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cli_file_backend_reads_password_from_env() {
    let daemon = start_daemon().await;
    let home = daemon.dir.path();

    let mut cmd = hubvpn(home);
    cmd.env("HUBVPN_KEYRING_PASSWORD", "correct horse")
        .args(["keys", "add", "carol", "--backend", "file"]);
    output_of(cmd).await.assert().success();

    let mut cmd = hubvpn(home);
    cmd.args(["keys", "show", "carol", "--backend", "file"])
        .write_stdin("battery staple\n");
    output_of(cmd)
        .await
        .assert()
        .failure()
        .stderr(predicate::str::contains("1006"));
}
