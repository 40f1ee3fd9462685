use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// Top-level application configuration.
///
/// Layered from built-in defaults, an optional `config/default` file and
/// `STOCKLEDGER_*` environment variables (double underscore as separator,
/// e.g. `STOCKLEDGER_DATABASE__URL`).
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    pub enabled: bool,
    /// TTL applied to read-through entries. Divergence between cache and
    /// store after a missed invalidation is bounded by this value.
    pub default_ttl_secs: u64,
    pub max_entries: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    pub level: String,
    pub json: bool,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("database.url", "sqlite::memory:")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 1)?
            .set_default("database.connect_timeout_secs", 30)?
            .set_default("database.idle_timeout_secs", 600)?
            .set_default("cache.enabled", true)?
            .set_default("cache.default_ttl_secs", 300)?
            .set_default("cache.max_entries", 10_000)?
            .set_default("log.level", "info")?
            .set_default("log.json", false)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(Environment::with_prefix("STOCKLEDGER").separator("__"))
            .build()?
            .try_deserialize()
    }
}

impl CacheSettings {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

impl DatabaseSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}
