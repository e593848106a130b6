//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` (or the file named by `XEGGEX_CONFIG`) into
//! strongly-typed structs. The `[options]` table carries the agent's
//! host-style string options; see [`crate::options`].

use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::fs;

use crate::options::{RawOptions, API_KEY_ENV, API_SECRET_ENV};
use crate::storage::events::DEFAULT_EVENT_DB;
use crate::storage::DEFAULT_SNAPSHOT_FILE;

/// Env var naming the config file.
pub const CONFIG_PATH_ENV: &str = "XEGGEX_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub options: RawOptions,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    /// Seconds between scheduled ticks.
    #[serde(default = "default_schedule_interval_secs")]
    pub schedule_interval_secs: u64,
    #[serde(default)]
    pub dry_run: bool,
}

fn default_schedule_interval_secs() -> u64 {
    3600
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ExchangeConfig {
    /// Override for the API base URL (defaults to the public Xeggex API).
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_snapshot_file")]
    pub snapshot_file: String,
    #[serde(default = "default_event_db")]
    pub event_db: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            snapshot_file: default_snapshot_file(),
            event_db: default_event_db(),
        }
    }
}

fn default_snapshot_file() -> String {
    DEFAULT_SNAPSHOT_FILE.to_string()
}

fn default_event_db() -> String {
    DEFAULT_EVENT_DB.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 8088,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let mut config = Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config
            .options
            .fill_credentials_from_env(API_KEY_ENV, API_SECRET_ENV);
        Ok(config)
    }

    /// Parse configuration from TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        ensure!(
            config.agent.schedule_interval_secs > 0,
            "agent.schedule_interval_secs must be greater than zero"
        );
        Ok(config)
    }

    /// Config path from `XEGGEX_CONFIG`, else `config.toml`.
    pub fn default_path() -> String {
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
    }
}
