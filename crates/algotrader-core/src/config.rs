//! Application configuration management.
//!
//! This module handles loading and saving the client configuration: which
//! backend to talk to, which identity backend signs users in, where the
//! credential is kept, and the last used username.
//!
//! Configuration is stored at `~/.config/algotrader/config.json`. A few
//! settings can be overridden from the environment (see `apply_env`).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::DEFAULT_BASE_URL;

/// Application name used for config/data directory paths
const APP_NAME: &str = "algotrader";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Credential file name, used with `StorageKind::File`
const CREDENTIALS_FILE: &str = "credentials.json";

pub const ENV_API_URL: &str = "ALGOTRADER_API_URL";
pub const ENV_FIREBASE_API_KEY: &str = "ALGOTRADER_FIREBASE_API_KEY";
pub const ENV_STORAGE: &str = "ALGOTRADER_STORAGE";

/// Which identity backend signs users in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum IdentityConfig {
    /// The trading backend's own `auth/*` endpoints.
    #[default]
    Rest,
    /// Hosted identity provider, email/password accounts.
    Firebase { api_key: String },
}

/// Where the credential is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    File,
    Keyring,
}

impl StorageKind {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "file" => Some(StorageKind::File),
            "keyring" | "keychain" => Some(StorageKind::Keyring),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub identity: IdentityConfig,
    pub storage: StorageKind,
    /// Call `POST auth/logout` on logout (REST backend only).
    pub notify_logout: bool,
    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_BASE_URL.to_string(),
            identity: IdentityConfig::default(),
            storage: StorageKind::default(),
            notify_logout: false,
            last_username: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply environment overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|name| std::env::var(name).ok());
    }

    /// Apply overrides using `lookup` to read variables. Blank values are
    /// ignored.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = lookup(ENV_API_URL) {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(api_key) = lookup(ENV_FIREBASE_API_KEY) {
            self.identity = IdentityConfig::Firebase {
                api_key: api_key.trim().to_string(),
            };
        }
        if let Some(storage) = lookup(ENV_STORAGE) {
            match StorageKind::parse(&storage) {
                Some(kind) => self.storage = kind,
                None => tracing::warn!(value = %storage, "Ignoring unknown {}", ENV_STORAGE),
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn credentials_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join(CREDENTIALS_FILE))
    }
}
