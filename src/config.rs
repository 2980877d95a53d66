//! Configuration management
//!
//! Sources, later ones winning:
//! 1. Default values
//! 2. `config/default.toml` and `config/local.toml`
//! 3. `VEHICLE_SYNC__SECTION__KEY` environment variables
//! 4. The plain `DATABASE_URL`, `DATABASE_MAX_POOL_LIMIT` and
//!    `FETCH_WITH_RETRY_TIMES` variables

use serde::Deserialize;
use thiserror::Error;

use crate::cache::CacheConfig as TtlCacheConfig;
use crate::fetcher::{parse_max_attempts, RetryConfig, FETCH_RETRY_ENV};
use crate::pipeline::{SyncConfig as PipelineSyncConfig, DEFAULT_BASE_URL};

pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
pub const DATABASE_POOL_ENV: &str = "DATABASE_MAX_POOL_LIMIT";
pub const DEFAULT_MAX_POOL_SIZE: u32 = 50;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub fetch: FetchConfig,
    pub sync: SyncConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// sqlx connection URL, e.g. `sqlite://vehicles.db`
    pub url: String,
    pub max_pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    pub base_url: String,
    pub max_attempts: u32,
    pub timeout_seconds: u64,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    pub batch_size: usize,
    /// Only the first N makes are synced when set
    #[serde(default)]
    pub make_limit: Option<usize>,
    /// Periodic sync interval; 0 disables the background task
    pub interval_seconds: u64,
    pub run_on_startup: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub ttl_seconds: u64,
    pub max_entries: usize,
    pub cleanup_interval_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("database.url", "sqlite://vehicles.db")?
            .set_default("database.max_pool_size", DEFAULT_MAX_POOL_SIZE)?
            .set_default("fetch.base_url", DEFAULT_BASE_URL)?
            .set_default("fetch.max_attempts", crate::fetcher::DEFAULT_MAX_ATTEMPTS)?
            .set_default("fetch.timeout_seconds", 30)?
            .set_default("fetch.initial_backoff_ms", 200)?
            .set_default("fetch.max_backoff_ms", 5000)?
            .set_default("fetch.backoff_multiplier", 2.0)?
            .set_default("fetch.jitter_factor", 0.1)?
            .set_default("sync.batch_size", 100)?
            .set_default("sync.interval_seconds", 0)?
            .set_default("sync.run_on_startup", false)?
            .set_default("cache.ttl_seconds", 60)?
            .set_default("cache.max_entries", 1024)?
            .set_default("cache.cleanup_interval_seconds", 60)?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("VEHICLE_SYNC")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut app_config: Self = config.try_deserialize()?;
        app_config.apply_legacy_env(|key| std::env::var(key).ok());
        app_config.validate()?;
        Ok(app_config)
    }

    // Plain variables the service has always honoured. Non-numeric values fall
    // back to the built-in defaults rather than failing startup.
    pub fn apply_legacy_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(DATABASE_URL_ENV).filter(|url| !url.trim().is_empty()) {
            self.database.url = url;
        }
        if let Some(raw) = lookup(DATABASE_POOL_ENV) {
            self.database.max_pool_size = raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|size| *size > 0)
                .unwrap_or(DEFAULT_MAX_POOL_SIZE);
        }
        if let Some(raw) = lookup(FETCH_RETRY_ENV) {
            self.fetch.max_attempts = parse_max_attempts(Some(&raw));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.batch_size == 0 {
            return Err(ConfigError::Invalid("sync.batch_size must be > 0".to_string()));
        }
        if self.database.max_pool_size == 0 {
            return Err(ConfigError::Invalid(
                "database.max_pool_size must be > 0".to_string(),
            ));
        }
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must be set".to_string()));
        }
        if self.fetch.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "fetch.base_url must not be empty".to_string(),
            ));
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(ConfigError::Invalid(format!(
                "logging.format must be \"pretty\" or \"json\", got {:?}",
                self.logging.format
            )));
        }
        Ok(())
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.fetch.max_attempts,
            initial_backoff_ms: self.fetch.initial_backoff_ms,
            max_backoff_ms: self.fetch.max_backoff_ms,
            backoff_multiplier: self.fetch.backoff_multiplier,
            jitter_factor: self.fetch.jitter_factor,
        }
    }

    pub fn sync_config(&self) -> PipelineSyncConfig {
        PipelineSyncConfig {
            base_url: self.fetch.base_url.clone(),
            batch_size: self.sync.batch_size,
            make_limit: self.sync.make_limit,
        }
    }

    pub fn cache_config(&self) -> TtlCacheConfig {
        TtlCacheConfig {
            default_ttl_seconds: self.cache.ttl_seconds,
            max_entries: self.cache.max_entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use test_case::test_case;

    fn base_config() -> AppConfig {
        AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            database: DatabaseConfig {
                url: "sqlite://vehicles.db".to_string(),
                max_pool_size: DEFAULT_MAX_POOL_SIZE,
            },
            fetch: FetchConfig {
                base_url: DEFAULT_BASE_URL.to_string(),
                max_attempts: 3,
                timeout_seconds: 30,
                initial_backoff_ms: 200,
                max_backoff_ms: 5000,
                backoff_multiplier: 2.0,
                jitter_factor: 0.1,
            },
            sync: SyncConfig {
                batch_size: 100,
                make_limit: None,
                interval_seconds: 0,
                run_on_startup: false,
            },
            cache: CacheConfig {
                ttl_seconds: 60,
                max_entries: 1024,
                cleanup_interval_seconds: 60,
            },
            logging: LoggingConfig {
                format: "pretty".to_string(),
            },
        }
    }

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_legacy_env_overrides() {
        let mut config = base_config();
        config.apply_legacy_env(env(&[
            (DATABASE_URL_ENV, "sqlite::memory:"),
            (DATABASE_POOL_ENV, "8"),
            (FETCH_RETRY_ENV, "5"),
        ]));

        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.database.max_pool_size, 8);
        assert_eq!(config.fetch.max_attempts, 5);
        assert_eq!(config.retry_config().max_attempts, 5);
    }

    #[test_case("many", 50; "non numeric")]
    #[test_case("0", 50; "zero")]
    #[test_case(" 12 ", 12; "padded")]
    fn test_pool_size_parsing(raw: &str, expected: u32) {
        let mut config = base_config();
        config.apply_legacy_env(env(&[(DATABASE_POOL_ENV, raw)]));
        assert_eq!(config.database.max_pool_size, expected);
    }

    #[test]
    fn test_non_numeric_retry_count_falls_back() {
        let mut config = base_config();
        config.fetch.max_attempts = 7;
        config.apply_legacy_env(env(&[(FETCH_RETRY_ENV, "often")]));
        assert_eq!(config.fetch.max_attempts, 3);
    }

    #[test]
    fn test_absent_legacy_env_keeps_values() {
        let mut config = base_config();
        config.apply_legacy_env(env(&[]));
        assert_eq!(config.database.url, "sqlite://vehicles.db");
        assert_eq!(config.fetch.max_attempts, 3);
    }

    #[test]
    fn test_validate() {
        assert!(base_config().validate().is_ok());

        let mut config = base_config();
        config.sync.batch_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = base_config();
        config.fetch.base_url = " ".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = base_config();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_component_configs() {
        let mut config = base_config();
        config.sync.make_limit = Some(25);
        config.cache.ttl_seconds = 5;

        let sync = config.sync_config();
        assert_eq!(sync.base_url, DEFAULT_BASE_URL);
        assert_eq!(sync.batch_size, 100);
        assert_eq!(sync.make_limit, Some(25));
        assert_eq!(config.cache_config().default_ttl_seconds, 5);
    }
}
