//! Configuration loading and persistence.
//!
//! Reads `config.json` from the pushline config directory and applies
//! `PUSHLINE_*` environment overrides. The session token is never written
//! to disk; it comes from `PUSHLINE_TOKEN`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::time::Duration;
use std::{fs, path::PathBuf};

use crate::constants::DEFAULT_TOAST_INTERVAL;

/// Configuration for the notification client.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Base URL of the API server.
    pub server_url: String,
    /// Session token - NOT serialized to disk.
    #[serde(skip)]
    pub token: String,
    /// Push service host (http(s) or ws(s)).
    pub push_host: String,
    /// Push service application key.
    pub push_key: String,
    /// Milliseconds between consecutive toasts.
    pub toast_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8000".to_string(),
            token: String::new(),
            push_host: "http://localhost:6001".to_string(),
            push_key: "app-key".to_string(),
            toast_interval_ms: u64::try_from(DEFAULT_TOAST_INTERVAL.as_millis()).unwrap_or(1000),
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// `PUSHLINE_CONFIG_DIR` overrides the platform config directory
    /// (macOS: ~/Library/Application Support/pushline).
    pub fn config_dir() -> Result<PathBuf> {
        let dir = if let Ok(custom) = std::env::var("PUSHLINE_CONFIG_DIR") {
            PathBuf::from(custom)
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("pushline")
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
        Ok(dir)
    }

    /// Loads configuration from file, with environment variable overrides.
    ///
    /// A missing file yields defaults; a malformed one is an error.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file()?.unwrap_or_default();
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_from_file() -> Result<Option<Self>> {
        let config_path = Self::config_dir()?.join("config.json");
        if !config_path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;
        Ok(Some(config))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(server_url) = std::env::var("PUSHLINE_SERVER_URL") {
            self.server_url = server_url;
        }

        if let Ok(token) = std::env::var("PUSHLINE_TOKEN") {
            self.token = token;
        }

        if let Ok(push_host) = std::env::var("PUSHLINE_PUSH_HOST") {
            self.push_host = push_host;
        }

        if let Ok(push_key) = std::env::var("PUSHLINE_PUSH_KEY") {
            self.push_key = push_key;
        }

        if let Ok(interval) = std::env::var("PUSHLINE_TOAST_INTERVAL_MS") {
            match interval.parse::<u64>() {
                Ok(ms) => self.toast_interval_ms = ms,
                Err(_) => log::warn!("Ignoring invalid PUSHLINE_TOAST_INTERVAL_MS={}", interval),
            }
        }
    }

    /// Persists the current configuration to disk (token excluded).
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_dir()?.join("config.json");
        fs::write(&config_path, serde_json::to_string_pretty(self)?)?;

        #[cfg(unix)]
        fs::set_permissions(&config_path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    /// Delay between toasts.
    pub fn toast_interval(&self) -> Duration {
        Duration::from_millis(self.toast_interval_ms)
    }

    /// Whether a session token is available.
    pub fn has_token(&self) -> bool {
        !self.token.is_empty()
    }
}
