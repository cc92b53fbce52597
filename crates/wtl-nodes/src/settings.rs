use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::preview::DEFAULT_PIXEL_BUDGET;

/// Control server and polling settings, persisted as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_host")]
    pub host: String,
    /// 0 binds an ephemeral port.
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_pixel_budget")]
    pub preview_pixel_budget: u64,
}

fn default_true() -> bool { true }
fn default_host() -> String { "127.0.0.1".into() }
fn default_port() -> u16 { 8189 }
fn default_poll_interval_ms() -> u64 { 250 }
fn default_pixel_budget() -> u64 { DEFAULT_PIXEL_BUDGET }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_host(),
            port: default_port(),
            poll_interval_ms: default_poll_interval_ms(),
            preview_pixel_budget: DEFAULT_PIXEL_BUDGET,
        }
    }
}

impl ServerConfig {
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        config_dir.join("wtl-nodes").join("server.json")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("Loaded server config from {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("Failed to parse server config: {e}");
                    Self::default()
                }
            },
            Err(_) => {
                log::info!("No server config found, using defaults");
                Self::default()
            }
        }
    }

    pub fn save(&self) {
        self.save_to(&Self::config_path());
    }

    pub fn save_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::error!("Failed to create config dir: {e}");
                return;
            }
        }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    log::error!("Failed to write server config: {e}");
                } else {
                    log::debug!("Saved server config to {}", path.display());
                }
            }
            Err(e) => log::error!("Failed to serialize server config: {e}"),
        }
    }
}
