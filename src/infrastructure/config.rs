use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix of environment overrides, e.g. `TAXONOMIST__STORE__WORKBOOK_PATH`.
pub const ENV_PREFIX: &str = "TAXONOMIST";

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub store: StoreConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Spreadsheet identifier; part of every cache key.
    #[serde(default = "default_store_id")]
    pub store_id: String,
    /// JSON workbook backing the file store.
    pub workbook_path: PathBuf,
}

fn default_store_id() -> String {
    "local".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_ttl_secs() -> u64 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl AppConfig {
    /// Load a TOML file, then apply `TAXONOMIST__*` environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path
            .to_str()
            .with_context(|| format!("Config path is not valid UTF-8: {}", path.display()))?;

        let cfg = config::Config::builder()
            .add_source(config::File::new(path_str, config::FileFormat::Toml))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        cfg.try_deserialize()
            .with_context(|| "Failed to parse config TOML")
    }

    /// `<config dir>/taxonomist/config.toml`, or `./taxonomist.toml` when the
    /// platform has no config directory.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("taxonomist").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("taxonomist.toml"))
    }
}
