//! Configuration loading.
//!
//! Hierarchical:
//! 1. Default values in code
//! 2. Optional configuration file (`config/millstock.toml` unless overridden)
//! 3. Environment variable overrides with the `MILLSTOCK__` prefix, e.g.
//!    `MILLSTOCK__DATABASE__URL`

use std::time::Duration;

use config::{ConfigError, Environment, File};
use serde::Deserialize;

pub use millstock_observability::LogConfig;

/// Default location of the configuration file, without extension.
pub const DEFAULT_CONFIG_FILE: &str = "config/millstock";

/// Main configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct MillstockConfig {
    /// Database configuration
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Seconds to wait for a free connection
    pub acquire_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

impl MillstockConfig {
    /// Load from the default file location and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load from `file` (any format the `config` crate recognises by
    /// extension; missing is fine) and the environment.
    pub fn load_from(file: &str) -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            .set_default("database.url", "postgres://localhost/millstock")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 1)?
            .set_default("database.acquire_timeout_secs", 5)?
            .set_default("log.filter", "info")?
            .set_default("log.json", true)?
            .add_source(File::with_name(file).required(false))
            .add_source(
                Environment::with_prefix("MILLSTOCK")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_a_file() {
        let config = MillstockConfig::load_from("config/does-not-exist").unwrap();
        assert_eq!(config.database.acquire_timeout(), Duration::from_secs(5));
        assert!(config.database.max_connections >= config.database.min_connections);
        assert_eq!(config.log, LogConfig::default());
    }
}
