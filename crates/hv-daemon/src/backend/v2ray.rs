//! V2Ray relay backend
//!
//! The relay runs as a detached `v2ray` process exposing a local SOCKS proxy.
//! Its PID is kept in the configuration so a later disconnect can find it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use hv_core::{BackendError, TunnelConfig, V2RayConfig};
use serde_json::json;

use super::{
    home_tool, path_arg, remove_if_exists, write_private, CommandRunner, Platform, TunnelBackend,
};

/// Name of the relay configuration file in the home directory
pub const CONFIG_FILENAME: &str = "v2ray.json";

/// Executable name prefix used for liveness checks
const PROCESS_NAME: &str = "v2ray";

pub struct V2Ray {
    config: V2RayConfig,
    home: PathBuf,
    platform: Platform,
    runner: Arc<dyn CommandRunner>,
}

impl V2Ray {
    pub fn new(
        config: V2RayConfig,
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

    pub fn config(&self) -> &V2RayConfig {
        &self.config
    }

    pub fn config_path(&self) -> PathBuf {
        self.home.join(CONFIG_FILENAME)
    }

    fn program(&self) -> String {
        match self.platform {
            Platform::Windows => path_arg(&home_tool(&self.home, "V2Ray", "v2ray.exe")),
            _ => PROCESS_NAME.to_string(),
        }
    }

    /// Render the v2ray JSON configuration
    pub fn render(&self) -> serde_json::Value {
        let c = &self.config;
        json!({
            "api": {
                "services": ["StatsService"],
                "tag": "api"
            },
            "inbounds": [
                {
                    "listen": "127.0.0.1",
                    "port": c.api_port,
                    "protocol": "dokodemo-door",
                    "settings": { "address": "127.0.0.1" },
                    "tag": "api"
                },
                {
                    "listen": "127.0.0.1",
                    "port": c.proxy_port,
                    "protocol": "socks",
                    "settings": { "ip": "127.0.0.1", "udp": true },
                    "sniffing": { "destOverride": ["http", "tls"], "enabled": true },
                    "tag": "proxy"
                }
            ],
            "log": { "loglevel": "none" },
            "outbounds": [
                {
                    "protocol": "vmess",
                    "settings": {
                        "vnext": [
                            {
                                "address": c.address.to_string(),
                                "port": c.port,
                                "users": [
                                    { "alterId": 0, "id": c.id.to_string() }
                                ]
                            }
                        ]
                    },
                    "streamSettings": { "network": c.transport.as_str() },
                    "tag": "vmess"
                }
            ],
            "policy": {
                "levels": { "0": { "downlinkOnly": 0, "uplinkOnly": 0 } },
                "system": {
                    "statsOutboundDownlink": true,
                    "statsOutboundUplink": true
                }
            },
            "routing": {
                "rules": [
                    { "inboundTag": ["api"], "outboundTag": "api", "type": "field" }
                ]
            },
            "stats": {},
            "transport": {
                "dsSettings": {},
                "grpcSettings": {},
                "gunSettings": {},
                "httpSettings": {},
                "kcpSettings": {},
                "quicSettings": { "security": "chacha20-poly1305" },
                "tcpSettings": {},
                "wsSettings": {}
            }
        })
    }
}

#[async_trait]
impl TunnelBackend for V2Ray {
    fn handle(&self) -> &str {
        hv_core::tunnel::V2RAY_HANDLE
    }

    fn generate_config(&self) -> Result<Vec<u8>, BackendError> {
        serde_json::to_vec_pretty(&self.render())
            .map_err(|e| BackendError::Invalid(format!("v2ray config: {}", e)))
    }

    fn tunnel_config(&self) -> TunnelConfig {
        TunnelConfig::V2Ray(self.config.clone())
    }

    async fn pre_up(&self) -> Result<(), BackendError> {
        let contents = self.generate_config()?;
        write_private(&self.config_path(), &contents)
    }

    async fn up(&mut self) -> Result<(), BackendError> {
        let program = self.program();
        let args = vec![
            "run".to_string(),
            "--config".to_string(),
            path_arg(&self.config_path()),
        ];
        let pid = self.runner.spawn(&program, &args).await?;
        self.config.pid = Some(pid);
        tracing::info!(
            "V2Ray relay started (PID {}), SOCKS proxy on 127.0.0.1:{}",
            pid,
            self.config.proxy_port
        );
        Ok(())
    }

    async fn is_up(&self) -> bool {
        match self.config.pid {
            Some(pid) => self.runner.is_alive(pid, PROCESS_NAME).await,
            None => false,
        }
    }

    async fn down(&self) -> Result<(), BackendError> {
        let Some(pid) = self.config.pid else {
            tracing::debug!("V2Ray relay has no recorded PID");
            return Ok(());
        };
        if !self.runner.is_alive(pid, PROCESS_NAME).await {
            tracing::debug!("V2Ray relay (PID {}) already gone", pid);
            return Ok(());
        }
        self.runner.kill(pid).await?;
        tracing::info!("V2Ray relay (PID {}) stopped", pid);
        Ok(())
    }

    async fn post_down(&self) -> Result<(), BackendError> {
        remove_if_exists(&self.config_path())
    }

    async fn transfer(&self) -> (u64, u64) {
        (0, 0)
    }
}
