//! Configuration loading and management.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default location of the optional config file.
pub const DEFAULT_CONFIG_PATH: &str = ".settings-sync/config.yaml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub bus: BusConfig,
}

/// Which storage backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// SQLite file shared by every process on the host.
    #[default]
    Sqlite,
    /// Process-local map; nothing survives a restart.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(StoreBackend::Sqlite),
            "memory" => Ok(StoreBackend::Memory),
            other => bail!("unknown store backend '{other}'"),
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".settings-sync"))
        .unwrap_or_else(|| PathBuf::from(".settings-sync"))
        .join("settings.db")
}

/// Notification bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Notices buffered per topic before slow subscribers start lagging.
    #[serde(default = "default_bus_capacity")]
    pub capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: default_bus_capacity(),
        }
    }
}

fn default_bus_capacity() -> usize {
    crate::bus::DEFAULT_CAPACITY
}

impl Config {
    /// Load configuration from file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Load configuration from the default location or return defaults,
    /// then apply environment overrides.
    pub fn load_or_default() -> Self {
        let config = Self::load(DEFAULT_CONFIG_PATH).unwrap_or_default();
        config.with_env_overrides(|name| std::env::var(name).ok())
    }

    /// Apply `SETTINGS_SYNC_*` overrides read through `lookup`.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(backend) = lookup("SETTINGS_SYNC_BACKEND").and_then(|v| v.parse().ok()) {
            self.store.backend = backend;
        }

        if let Some(path) = lookup("SETTINGS_SYNC_DB_PATH") {
            self.store.path = PathBuf::from(path);
        }

        if let Some(capacity) = lookup("SETTINGS_SYNC_BUS_CAPACITY").and_then(|v| v.parse().ok()) {
            self.bus.capacity = capacity;
        }

        self
    }

    /// Ensure the database directory exists.
    pub fn ensure_db_dir(&self) -> Result<()> {
        if let Some(parent) = self.store.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}
