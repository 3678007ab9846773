//! Configuration loading and persistence.
//!
//! Reads and writes the blogctl configuration file. Secrets are not stored
//! here: the bearer token and cached application key live in the credential
//! store (OS keyring).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::{fs, path::PathBuf};

/// Configuration for the blogctl client.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    /// Base URL of the blog server (scheme + host, no `/api/v1` suffix).
    pub server_url: String,
    /// Explicit realtime endpoint base (`ws://…` / `wss://…`). When unset,
    /// it is derived from `server_url` with the matching socket scheme.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ws_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8080".to_string(),
            ws_url: None,
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// Directory selection priority:
    /// 1. `BLOGCTL_CONFIG_DIR` env var: explicit override
    /// 2. `BLOGCTL_ENV=test`: `./tmp/blogctl-test` (integration tests)
    /// 3. Default: platform config dir (e.g. `~/.config/blogctl`)
    pub fn config_dir() -> Result<PathBuf> {
        let dir = if let Ok(test_dir) = std::env::var("BLOGCTL_CONFIG_DIR") {
            PathBuf::from(test_dir)
        } else if std::env::var("BLOGCTL_ENV").map(|v| v == "test").unwrap_or(false) {
            PathBuf::from("tmp/blogctl-test")
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("blogctl")
        };
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Loads configuration from file, with environment variable overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file().unwrap_or_default();
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_from_file() -> Result<Self> {
        let config_path = Self::config_dir()?.join("config.json");
        if config_path.exists() {
            let content = fs::read_to_string(&config_path)?;
            Ok(serde_json::from_str(&content)?)
        } else {
            anyhow::bail!("Config file not found")
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(server_url) = std::env::var("BLOGCTL_SERVER_URL") {
            self.server_url = server_url;
        }
        if let Ok(ws_url) = std::env::var("BLOGCTL_WS_URL") {
            self.ws_url = Some(ws_url);
        }
    }

    /// Persists the current configuration to disk.
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_dir()?.join("config.json");
        fs::write(&config_path, serde_json::to_string_pretty(self)?)?;

        // Owner read/write only
        #[cfg(unix)]
        fs::set_permissions(&config_path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    /// Realtime endpoint base URL, derived from the server URL when no
    /// explicit override is configured. The socket scheme always matches
    /// the HTTP scheme (http → ws, https → wss).
    pub fn realtime_base(&self) -> String {
        match &self.ws_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => crate::ws::http_to_ws_scheme(self.server_url.trim_end_matches('/')),
        }
    }
}
