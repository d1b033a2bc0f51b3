//! Layered configuration.
//!
//! Sources, highest priority first:
//! 1. Environment variables (`CLINIC_*`, `__` separates sections, so
//!    `CLINIC_CLIENT__POLL_INTERVAL_MS` sets `client.poll_interval_ms`)
//! 2. The TOML file named by `CLINIC_CONFIG`, or `clinic.toml` in the working directory
//! 3. Built-in defaults

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_PATH_ENV: &str = "CLINIC_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "clinic.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Figment(#[from] figment::Error),

    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClinicConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: PathBuf::from("clinic.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Directory served for any path other than `/api`.
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: "127.0.0.1:3000".to_string(),
            static_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub poll_interval_ms: u64,
    pub cache_ttl_ms: u64,
    pub request_timeout_ms: u64,
    pub retries: u32,
    pub debounce_ms: u64,
    pub per_page: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            base_url: "http://127.0.0.1:3000".to_string(),
            poll_interval_ms: 3000,
            cache_ttl_ms: 10_000,
            request_timeout_ms: 10_000,
            retries: 2,
            debounce_ms: 300,
            per_page: 10,
        }
    }
}

impl ClientConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl ClinicConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config: ClinicConfig = Self::figment().extract()?;
        config.check()?;
        Ok(config)
    }

    /// Provider chain, public so callers can merge extra providers on top.
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        let file = std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        if file.exists() {
            figment = figment.merge(Toml::file(file));
        }

        figment.merge(Env::prefixed("CLINIC_").split("__"))
    }

    fn check(&self) -> Result<(), ConfigError> {
        let zero = [
            ("client.poll_interval_ms", self.client.poll_interval_ms),
            ("client.request_timeout_ms", self.client.request_timeout_ms),
            ("client.per_page", self.client.per_page as u64),
        ]
        .into_iter()
        .find(|(_, value)| *value == 0);

        match zero {
            Some((field, _)) => Err(ConfigError::InvalidValue {
                field: field.to_string(),
                reason: "must be greater than zero".to_string(),
            }),
            None => Ok(()),
        }
    }
}
