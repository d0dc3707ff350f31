//! WireGuard backend
//!
//! Linux and macOS go through `wg-quick`; Windows installs a tunnel service
//! with the bundled `wireguard.exe`. Liveness and counters come from `wg`.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use hv_core::tunnel::ALLOWED_IPS;
use hv_core::{BackendError, TunnelConfig, WireGuardConfig};

use super::{
    home_tool, path_arg, remove_if_exists, write_private, CommandRunner, Platform, TunnelBackend,
};

/// Directory under the home holding the Windows WireGuard tools
const WINDOWS_TOOLS_DIR: &str = "WireGuard";

/// Where wg-quick on macOS records the utun name for a tunnel
const MACOS_NAME_DIR: &str = "/var/run/wireguard";

pub struct WireGuard {
    config: WireGuardConfig,
    home: PathBuf,
    platform: Platform,
    runner: Arc<dyn CommandRunner>,
}

impl WireGuard {
    pub fn new(
        config: WireGuardConfig,
        home: &Path,
        platform: Platform,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            config,
            home: home.to_path_buf(),
            platform,
            runner,
        }
    }

    pub fn config(&self) -> &WireGuardConfig {
        &self.config
    }

    /// Path of the wg-quick configuration file
    pub fn config_path(&self) -> PathBuf {
        self.home.join(format!("{}.conf", self.config.name))
    }

    fn tool(&self, name: &str) -> String {
        match self.platform {
            Platform::Windows => path_arg(&home_tool(
                &self.home,
                WINDOWS_TOOLS_DIR,
                &format!("{}.exe", name),
            )),
            _ => name.to_string(),
        }
    }

    /// Kernel name of the interface
    async fn real_interface(&self) -> Option<String> {
        match self.platform {
            Platform::MacOs => {
                let path = Path::new(MACOS_NAME_DIR).join(format!("{}.name", self.config.name));
                let contents = tokio::fs::read_to_string(&path).await.ok()?;
                let name = contents.lines().next()?.trim().to_string();
                (!name.is_empty()).then_some(name)
            }
            _ => Some(self.config.name.clone()),
        }
    }

    /// Render the wg-quick INI file
    pub fn render(&self) -> String {
        let c = &self.config;
        let mut out = String::new();

        let _ = writeln!(out, "[Interface]");
        let _ = writeln!(out, "PrivateKey = {}", c.private_key);
        let _ = writeln!(out, "ListenPort = {}", c.listen_port);
        let _ = writeln!(out, "Address = {}", c.addresses().join(", "));
        if !c.dns.is_empty() {
            let dns: Vec<String> = c.dns.iter().map(ToString::to_string).collect();
            let _ = writeln!(out, "DNS = {}", dns.join(", "));
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "[Peer]");
        let _ = writeln!(out, "PublicKey = {}", c.peer.public_key);
        let _ = writeln!(out, "AllowedIPs = {}", ALLOWED_IPS.join(", "));
        let _ = writeln!(out, "Endpoint = {}", c.peer.endpoint);
        let _ = writeln!(out, "PersistentKeepalive = {}", c.peer.persistent_keepalive);
        out
    }
}

/// Parse `wg show <iface> transfer` into (upload, download)
fn parse_transfer(output: &str) -> Option<(u64, u64)> {
    output.lines().find_map(|line| {
        let columns: Vec<&str> = line.split('\t').collect();
        if columns.len() != 3 {
            return None;
        }
        let rx = columns[1].trim().parse::<u64>().ok()?;
        let tx = columns[2].trim().parse::<u64>().ok()?;
        Some((tx, rx))
    })
}

/// Errors wg-quick and wg report for an interface that is already gone
fn is_absent(stderr: &str) -> bool {
    stderr.contains("No such device") || stderr.contains("is not a WireGuard interface")
}

#[async_trait]
impl TunnelBackend for WireGuard {
    fn handle(&self) -> &str {
        &self.config.name
    }

    fn generate_config(&self) -> Result<Vec<u8>, BackendError> {
        if self.config.private_key.is_empty() {
            return Err(BackendError::Invalid(
                "WireGuard private key is missing".to_string(),
            ));
        }
        Ok(self.render().into_bytes())
    }

    fn tunnel_config(&self) -> TunnelConfig {
        TunnelConfig::WireGuard(self.config.clone())
    }

    async fn pre_up(&self) -> Result<(), BackendError> {
        let contents = self.generate_config()?;
        let path = self.config_path();
        write_private(&path, &contents)?;
        tracing::debug!("Wrote WireGuard config {:?}", path);
        Ok(())
    }

    async fn up(&mut self) -> Result<(), BackendError> {
        let conf = path_arg(&self.config_path());
        let (program, args) = match self.platform {
            Platform::Windows => (
                self.tool("wireguard"),
                vec!["/installtunnelservice".to_string(), conf],
            ),
            _ => ("wg-quick".to_string(), vec!["up".to_string(), conf]),
        };

        self.runner.run(&program, &args).await?.check(&program)?;
        tracing::info!("WireGuard interface {} is up", self.config.name);
        Ok(())
    }

    async fn is_up(&self) -> bool {
        let Some(iface) = self.real_interface().await else {
            return false;
        };
        let program = self.tool("wg");
        match self.runner.run(&program, &["show".to_string(), iface]).await {
            Ok(output) => {
                output.success
                    && !output.stdout.contains("No such device")
                    && !output.stderr.contains("No such device")
            }
            Err(_) => false,
        }
    }

    async fn down(&self) -> Result<(), BackendError> {
        let (program, args) = match self.platform {
            Platform::Windows => (
                self.tool("wireguard"),
                vec![
                    "/uninstalltunnelservice".to_string(),
                    self.config.name.clone(),
                ],
            ),
            // wg-quick resolves a bare name under /etc/wireguard, so hand it
            // the file `up` was given
            Platform::MacOs | Platform::Linux => (
                "wg-quick".to_string(),
                vec!["down".to_string(), path_arg(&self.config_path())],
            ),
        };

        let output = self.runner.run(&program, &args).await?;
        if !output.success {
            if is_absent(&output.stderr) || !self.is_up().await {
                tracing::debug!("WireGuard interface {} already absent", self.config.name);
                return Ok(());
            }
            output.check(&program)?;
        }
        tracing::info!("WireGuard interface {} is down", self.config.name);
        Ok(())
    }

    async fn post_down(&self) -> Result<(), BackendError> {
        remove_if_exists(&self.config_path())
    }

    async fn transfer(&self) -> (u64, u64) {
        let Some(iface) = self.real_interface().await else {
            return (0, 0);
        };
        let program = self.tool("wg");
        let args = ["show".to_string(), iface, "transfer".to_string()];
        match self.runner.run(&program, &args).await {
            Ok(output) if output.success => parse_transfer(&output.stdout).unwrap_or((0, 0)),
            _ => (0, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::scripted::{fail, ok, ScriptedRunner};
    use hv_core::WireGuardPeer;
    use tempfile::TempDir;

    fn config() -> WireGuardConfig {
        WireGuardConfig {
            name: "wg99".to_string(),
            private_key: "cHJpdmF0ZQ==".to_string(),
            ipv4: "10.8.0.2".parse().unwrap(),
            ipv6: "fd00::2".parse().unwrap(),
            listen_port: 51000,
            dns: vec!["10.8.0.1".parse().unwrap(), "1.1.1.1".parse().unwrap()],
            peer: WireGuardPeer {
                public_key: "cGVlcg==".to_string(),
                endpoint: "203.0.113.5:51820".parse().unwrap(),
                persistent_keepalive: 15,
            },
        }
    }

    fn backend(dir: &TempDir, platform: Platform) -> (WireGuard, Arc<ScriptedRunner>) {
        let runner = Arc::new(ScriptedRunner::default());
        let wg = WireGuard::new(config(), dir.path(), platform, runner.clone());
        (wg, runner)
    }

    #[test]
    fn test_render() {
        let dir = TempDir::new().unwrap();
        let (wg, _) = backend(&dir, Platform::Linux);
        let rendered = wg.render();

        assert!(rendered.contains("PrivateKey = cHJpdmF0ZQ==\n"));
        assert!(rendered.contains("ListenPort = 51000\n"));
        assert!(rendered.contains("Address = 10.8.0.2/32, fd00::2/128\n"));
        assert!(rendered.contains("DNS = 10.8.0.1, 1.1.1.1\n"));
        assert!(rendered.contains("AllowedIPs = 0.0.0.0/0, ::/0\n"));
        assert!(rendered.contains("Endpoint = 203.0.113.5:51820\n"));
        assert!(rendered.contains("PersistentKeepalive = 15\n"));
    }

    #[test]
    fn test_generate_config_requires_private_key() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::default());
        let mut c = config();
        c.private_key.clear();
        let wg = WireGuard::new(c, dir.path(), Platform::Linux, runner);
        assert!(matches!(wg.generate_config(), Err(BackendError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_lifecycle_linux() {
        let dir = TempDir::new().unwrap();
        let (mut wg, runner) = backend(&dir, Platform::Linux);

        wg.pre_up().await.unwrap();
        assert!(wg.config_path().exists());
        wg.up().await.unwrap();
        wg.down().await.unwrap();
        wg.post_down().await.unwrap();
        assert!(!wg.config_path().exists());

        let conf = wg.config_path().to_string_lossy().into_owned();
        assert_eq!(
            runner.calls(),
            vec![format!("wg-quick up {}", conf), format!("wg-quick down {}", conf)]
        );
    }

    #[tokio::test]
    async fn test_down_failure_with_live_interface_is_an_error() {
        let dir = TempDir::new().unwrap();
        let (wg, runner) = backend(&dir, Platform::Linux);
        runner.respond("wg show wg99", ok("interface: wg99\n"));
        runner.respond(
            "wg-quick down",
            fail("wg-quick: `/etc/wireguard/wg99.conf' does not exist"),
        );

        assert!(wg.is_up().await);
        let err = wg.down().await.unwrap_err();
        assert!(err.to_string().contains("does not exist"));
        assert!(wg.is_up().await);
    }

    #[tokio::test]
    async fn test_down_failure_after_interface_vanished_is_success() {
        let dir = TempDir::new().unwrap();
        let (wg, runner) = backend(&dir, Platform::Linux);
        runner.respond("wg show wg99", fail("Unable to access interface: No such device"));
        runner.respond("wg-quick down", fail("wg-quick: `/tmp/wg99.conf' does not exist"));

        wg.down().await.unwrap();
        assert_eq!(runner.calls().last().unwrap(), "wg show wg99");
    }

    #[tokio::test]
    async fn test_windows_uses_tunnel_service() {
        let dir = TempDir::new().unwrap();
        let (mut wg, runner) = backend(&dir, Platform::Windows);

        wg.up().await.unwrap();
        wg.down().await.unwrap();

        let calls = runner.calls();
        assert!(calls[0].contains("wireguard.exe /installtunnelservice"));
        assert!(calls[1].ends_with("wireguard.exe /uninstalltunnelservice wg99"));
    }

    #[tokio::test]
    async fn test_up_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let (mut wg, runner) = backend(&dir, Platform::Linux);
        runner.respond("wg-quick up", fail("RTNETLINK answers: Operation not permitted"));

        let err = wg.up().await.unwrap_err();
        assert!(err.to_string().contains("Operation not permitted"));
    }

    #[tokio::test]
    async fn test_is_up() {
        let dir = TempDir::new().unwrap();
        let (wg, runner) = backend(&dir, Platform::Linux);

        runner.respond("wg show wg99", ok("interface: wg99\n"));
        assert!(wg.is_up().await);

        runner.respond("wg show wg99", fail("Unable to access interface: No such device"));
        assert!(!wg.is_up().await);
    }

    #[tokio::test]
    async fn test_down_absent_interface_is_success() {
        let dir = TempDir::new().unwrap();
        let (wg, runner) = backend(&dir, Platform::Linux);
        runner.respond("wg-quick down", fail("wg-quick: `wg99' is not a WireGuard interface"));
        wg.down().await.unwrap();

        runner.respond("wg-quick down", fail("permission denied"));
        assert!(wg.down().await.is_err());
    }

    #[tokio::test]
    async fn test_transfer() {
        let dir = TempDir::new().unwrap();
        let (wg, runner) = backend(&dir, Platform::Linux);

        runner.respond("wg show wg99 transfer", ok("cGVlcg==\t2048\t1024\n"));
        assert_eq!(wg.transfer().await, (1024, 2048));

        runner.respond("wg show wg99 transfer", fail("No such device"));
        assert_eq!(wg.transfer().await, (0, 0));

        runner.respond("wg show wg99 transfer", ok("garbage"));
        assert_eq!(wg.transfer().await, (0, 0));
    }

    #[test]
    fn test_parse_transfer_skips_other_lines() {
        assert_eq!(parse_transfer("\nabc\t1\t2\n"), Some((2, 1)));
        assert_eq!(parse_transfer("abc\tx\t2\n"), None);
    }
}
