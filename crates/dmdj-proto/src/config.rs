use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

use super::platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub timing: TimingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the remote control service, e.g. `http://10.0.0.5:8000`.
    /// Overridden by `$DMDJ_API`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Quiet period before a slider value is committed.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Press duration that turns a navbar tap into a mute toggle.
    #[serde(default = "default_hold_ms")]
    pub hold_ms: u64,
    /// Fixed delay before reconnecting the push channel.
    #[serde(default = "default_reconnect_ms")]
    pub reconnect_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            hold_ms: default_hold_ms(),
            reconnect_ms: default_reconnect_ms(),
        }
    }
}

impl TimingConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn hold(&self) -> Duration {
        Duration::from_millis(self.hold_ms)
    }

    pub fn reconnect(&self) -> Duration {
        Duration::from_millis(self.reconnect_ms)
    }
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_hold_ms() -> u64 {
    500
}

fn default_reconnect_ms() -> u64 {
    2000
}

impl Config {
    /// Load `config.toml`, creating it with defaults on first run, then
    /// apply the `$DMDJ_API` override.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        let config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::from_toml(&content)?
        } else {
            let config = Self::default();
            config.save()?;
            info!("config: wrote defaults to {}", config_path.display());
            config
        };

        Ok(config.with_env_override())
    }

    /// Apply `$DMDJ_API` if it is set and non-blank.
    pub fn with_env_override(mut self) -> Self {
        if let Ok(url) = std::env::var(platform::API_ENV_VAR) {
            self.apply_env_override(&url);
        }
        self
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }

    fn apply_env_override(&mut self, url: &str) {
        if !url.trim().is_empty() {
            self.remote.base_url = Some(url.trim().to_string());
        }
    }

    /// Base URL without a trailing slash, or `None` when unset.
    pub fn base_url(&self) -> Option<String> {
        let url = self.remote.base_url.as_deref()?.trim().trim_end_matches('/');
        if url.is_empty() {
            None
        } else {
            Some(url.to_string())
        }
    }

    /// Push channel URL: the base URL with `http` swapped for `ws`, plus `/ws`.
    pub fn push_url(&self) -> Option<String> {
        let base = self.base_url()?;
        let ws_base = match base.strip_prefix("http") {
            Some(rest) => format!("ws{}", rest),
            None => base,
        };
        Some(format!("{}/ws", ws_base))
    }
}
