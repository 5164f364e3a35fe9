use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

pub const DEFAULT_MAX_SIZE: usize = 10_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub history: HistoryConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub max_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    /// Nothing is persisted
    #[default]
    Transient,
    /// Process-lifetime key-value map
    Memory,
    /// One JSON file per channel under `base_dir`
    File,
    /// Key-value entries in a redb database at `database_path`
    Redb,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackendKind,
    pub base_dir: PathBuf,
    pub database_path: PathBuf,
    pub key_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackendKind::default(),
            base_dir: PathBuf::from(crate::storage::filesystem::DEFAULT_BASE_DIR),
            database_path: PathBuf::from("./history.redb"),
            key_prefix: crate::storage::kv::DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Layer `config/{CONFIG_ENV}` (optional) under `CAUSAL_HISTORY__*` variables.
    pub fn new() -> Result<Self, ConfigError> {
        let config_env = env::var("CONFIG_ENV").unwrap_or_else(|_| "default".to_string());
        Self::from_file(&format!("config/{}", config_env))
    }

    pub fn from_file(name: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(name).required(false))
            .add_source(Environment::with_prefix("CAUSAL_HISTORY").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
