//! Configuration management for the federation layer
//!
//! TOML file support, environment variable overrides, and sensible
//! defaults. Durations are stored as plain integers so files stay readable;
//! accessor methods hand out `Duration`s.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Remote find/fetch behavior
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Find result cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging and metrics
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// Remote request behavior
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteConfig {
    /// Seconds a failed backend stays unavailable
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Find cache TTL, also the time bucket width of find cache keys
    #[serde(default = "default_find_cache_duration_secs")]
    pub find_cache_duration_secs: u64,

    /// Transport timeout for find requests
    #[serde(default = "default_find_timeout_ms")]
    pub find_timeout_ms: u64,

    /// Transport timeout for bulk fetches, also the coalesced wait bound
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Coordinator size at which eviction sweeps start
    #[serde(default = "default_reader_cache_size_limit")]
    pub reader_cache_size_limit: usize,

    /// Response format identifier sent to backends
    #[serde(default = "default_format")]
    pub format: String,
}

/// Which find cache implementation to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// In-process TTL cache
    Local,
    /// Shared Redis cache
    Redis,
    /// No caching; every lookup misses
    Disabled,
}

/// Find result cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Cache implementation
    #[serde(default = "default_cache_backend")]
    pub backend: CacheBackend,

    /// Entry limit of the local cache
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,

    /// Redis URL for the shared cache
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Prefix for Redis keys
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

/// Monitoring configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON log lines
    #[serde(default)]
    pub structured_logging: bool,

    /// Record Prometheus metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

// Default value functions
fn default_retry_delay_secs() -> u64 { 60 }
fn default_find_cache_duration_secs() -> u64 { 300 }
fn default_find_timeout_ms() -> u64 { 3_000 }
fn default_fetch_timeout_ms() -> u64 { 6_000 }
fn default_reader_cache_size_limit() -> usize { 1_000 }
fn default_format() -> String { "json".to_string() }
fn default_cache_backend() -> CacheBackend { CacheBackend::Local }
fn default_cache_max_entries() -> usize { 10_000 }
fn default_redis_url() -> String { "redis://127.0.0.1:6379".to_string() }
fn default_key_prefix() -> String { "kuba:find:".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_true() -> bool { true }

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            retry_delay_secs: default_retry_delay_secs(),
            find_cache_duration_secs: default_find_cache_duration_secs(),
            find_timeout_ms: default_find_timeout_ms(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            reader_cache_size_limit: default_reader_cache_size_limit(),
            format: default_format(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_cache_backend(),
            max_entries: default_cache_max_entries(),
            redis_url: default_redis_url(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            structured_logging: false,
            metrics_enabled: true,
        }
    }
}

impl RemoteConfig {
    /// Circuit breaker cooldown
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    /// Find cache TTL
    pub fn find_cache_duration(&self) -> Duration {
        Duration::from_secs(self.find_cache_duration_secs)
    }

    /// Find transport timeout
    pub fn find_timeout(&self) -> Duration {
        Duration::from_millis(self.find_timeout_ms)
    }

    /// Fetch transport timeout and coalesced wait bound
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Set the circuit breaker cooldown
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_secs = delay.as_secs();
        self
    }

    /// Set the fetch timeout
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the coordinator size limit
    pub fn with_size_limit(mut self, limit: usize) -> Self {
        self.reader_cache_size_limit = limit;
        self
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        toml::from_str(&contents).map_err(|e| {
            Error::Configuration(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from environment variables only
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides
    ///
    /// Unparseable values are ignored and the existing setting is kept.
    pub fn apply_env_overrides(&mut self) {
        // Remote
        override_parsed("TSDB_REMOTE_RETRY_DELAY_SECS", &mut self.remote.retry_delay_secs);
        override_parsed(
            "TSDB_REMOTE_FIND_CACHE_DURATION_SECS",
            &mut self.remote.find_cache_duration_secs,
        );
        override_parsed("TSDB_REMOTE_FIND_TIMEOUT_MS", &mut self.remote.find_timeout_ms);
        override_parsed("TSDB_REMOTE_FETCH_TIMEOUT_MS", &mut self.remote.fetch_timeout_ms);
        override_parsed(
            "TSDB_REMOTE_READER_CACHE_SIZE_LIMIT",
            &mut self.remote.reader_cache_size_limit,
        );
        if let Ok(format) = std::env::var("TSDB_REMOTE_FORMAT") {
            self.remote.format = format;
        }

        // Cache
        if let Ok(backend) = std::env::var("TSDB_REMOTE_CACHE_BACKEND") {
            match backend.to_ascii_lowercase().as_str() {
                "local" => self.cache.backend = CacheBackend::Local,
                "redis" => self.cache.backend = CacheBackend::Redis,
                "disabled" | "none" => self.cache.backend = CacheBackend::Disabled,
                _ => {}
            }
        }
        if let Ok(url) = std::env::var("TSDB_REMOTE_REDIS_URL") {
            self.cache.redis_url = url;
        }

        // Monitoring
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            self.monitoring.log_level = log_level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.remote.find_cache_duration_secs == 0 {
            return Err(Error::Configuration(
                "Find cache duration must be > 0".to_string(),
            ));
        }
        if self.remote.fetch_timeout_ms == 0 {
            return Err(Error::Configuration("Fetch timeout must be > 0".to_string()));
        }
        if self.remote.find_timeout_ms == 0 {
            return Err(Error::Configuration("Find timeout must be > 0".to_string()));
        }
        if self.remote.reader_cache_size_limit == 0 {
            return Err(Error::Configuration(
                "Reader cache size limit must be > 0".to_string(),
            ));
        }
        if crate::remote::transport::wire_format(&self.remote.format).is_none() {
            return Err(Error::Configuration(format!(
                "Unsupported wire format: {:?}",
                self.remote.format
            )));
        }

        if self.cache.backend == CacheBackend::Local && self.cache.max_entries == 0 {
            return Err(Error::Configuration(
                "Local cache max entries must be > 0".to_string(),
            ));
        }
        if self.cache.backend == CacheBackend::Redis && self.cache.redis_url.is_empty() {
            return Err(Error::Configuration("Redis URL cannot be empty".to_string()));
        }

        Ok(())
    }

    /// Save configuration to TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Serialization(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents)?;
        Ok(())
    }
}

fn override_parsed<T: std::str::FromStr>(var: &str, target: &mut T) {
    if let Ok(raw) = std::env::var(var) {
        if let Ok(value) = raw.parse() {
            *target = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.remote.retry_delay(), Duration::from_secs(60));
        assert_eq!(config.remote.fetch_timeout(), Duration::from_secs(6));
        assert_eq!(config.cache.backend, CacheBackend::Local);
        assert!(config.monitoring.metrics_enabled);
    }

    #[test]
    fn test_config_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_fetch_timeout() {
        let mut config = Config::default();
        config.remote.fetch_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [remote]
            retry_delay_secs = 5

            [cache]
            backend = "disabled"
            "#,
        )
        .unwrap();
        assert_eq!(config.remote.retry_delay_secs, 5);
        assert_eq!(config.remote.find_cache_duration_secs, 300);
        assert_eq!(config.cache.backend, CacheBackend::Disabled);
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("TSDB_REMOTE_FETCH_TIMEOUT_MS", "1500");
        let config = Config::from_env();
        assert_eq!(config.remote.fetch_timeout_ms, 1500);
        std::env::remove_var("TSDB_REMOTE_FETCH_TIMEOUT_MS");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("federation.toml");

        let mut config = Config::default();
        config.remote.reader_cache_size_limit = 42;
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.remote.reader_cache_size_limit, 42);
    }
}
