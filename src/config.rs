//! Configuration for the tiered store, rate limiter, and reaper.
//!
//! Every field can be set programmatically, deserialized with serde, or
//! loaded from `STRATAKV_*` environment variables via [`StoreConfig::from_env`].

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for a [`TieredStore`](crate::store::TieredStore).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Prefix prepended to every key before it reaches a tier backend.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// TTL applied when a `set` carries no explicit TTL, in seconds.
    /// `None` means entries without a TTL never expire by age.
    #[serde(default)]
    pub default_ttl_secs: Option<u64>,

    /// Enable the shared (networked) tier.
    #[serde(default = "default_true")]
    pub shared_enabled: bool,

    /// Enable the durable (relational) tier.
    #[serde(default = "default_true")]
    pub durable_enabled: bool,

    /// Connection URL for the shared tier (e.g. `redis://127.0.0.1:6379`).
    #[serde(default)]
    pub shared_url: Option<String>,

    /// Connection URL for the durable tier (e.g. `postgres://...`).
    #[serde(default)]
    pub durable_url: Option<String>,

    /// Per-call timeout for shared/durable tier operations, in milliseconds.
    /// A timed-out call is treated the same as an unreachable backend.
    #[serde(default = "default_backend_timeout_ms")]
    pub backend_timeout_ms: u64,

    /// Attempt count for shared-tier operations before giving up.
    #[serde(default = "default_shared_retries")]
    pub shared_retries: u32,

    /// Capacity of the in-process tier in bytes.
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity_bytes: u64,

    /// Route durable writes through the write-behind queue instead of
    /// awaiting them on the hot path.
    #[serde(default = "default_true")]
    pub durable_write_behind: bool,

    /// Depth of the durable write-behind queue.
    #[serde(default = "default_write_behind_depth")]
    pub write_behind_depth: usize,

    /// Default rate-limit window length, in milliseconds.
    #[serde(default = "default_window_ms")]
    pub default_window_ms: u64,

    /// Default maximum requests per window.
    #[serde(default = "default_max_requests")]
    pub default_max_requests: u64,

    /// Reaper settings.
    #[serde(default)]
    pub reaper: ReaperConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            default_ttl_secs: None,
            shared_enabled: true,
            durable_enabled: true,
            shared_url: None,
            durable_url: None,
            backend_timeout_ms: default_backend_timeout_ms(),
            shared_retries: default_shared_retries(),
            memory_capacity_bytes: default_memory_capacity(),
            durable_write_behind: true,
            write_behind_depth: default_write_behind_depth(),
            default_window_ms: default_window_ms(),
            default_max_requests: default_max_requests(),
            reaper: ReaperConfig::default(),
        }
    }
}

/// Reaper scheduling and retention settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaperConfig {
    /// Interval between reaper runs, in seconds.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// Retention for audit-style durable rows, in seconds. This is a
    /// separate policy from cache TTL: audit rows outlive their windows.
    #[serde(default = "default_audit_retention_secs")]
    pub audit_retention_secs: u64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: default_cleanup_interval_secs(),
            audit_retention_secs: default_audit_retention_secs(),
        }
    }
}

fn default_namespace() -> String {
    "stratakv".to_string()
}

fn default_true() -> bool {
    true
}

fn default_backend_timeout_ms() -> u64 {
    2_000
}

fn default_shared_retries() -> u32 {
    3
}

fn default_memory_capacity() -> u64 {
    256 * 1024 * 1024 // 256MB
}

fn default_write_behind_depth() -> usize {
    4096
}

fn default_window_ms() -> u64 {
    60_000
}

fn default_max_requests() -> u64 {
    100
}

fn default_cleanup_interval_secs() -> u64 {
    60
}

fn default_audit_retention_secs() -> u64 {
    30 * 24 * 3600 // 30 days
}

impl StoreConfig {
    /// Load configuration from `STRATAKV_*` environment variables, falling
    /// back to defaults for anything unset. Malformed values fail fast with
    /// [`Error::Config`] rather than being silently ignored.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = read_env("STRATAKV_NAMESPACE") {
            config.namespace = v;
        }
        if let Some(v) = read_env("STRATAKV_DEFAULT_TTL_SECS") {
            config.default_ttl_secs = Some(parse_env("STRATAKV_DEFAULT_TTL_SECS", &v)?);
        }
        if let Some(v) = read_env("STRATAKV_SHARED_ENABLED") {
            config.shared_enabled = parse_env("STRATAKV_SHARED_ENABLED", &v)?;
        }
        if let Some(v) = read_env("STRATAKV_DURABLE_ENABLED") {
            config.durable_enabled = parse_env("STRATAKV_DURABLE_ENABLED", &v)?;
        }
        if let Some(v) = read_env("STRATAKV_SHARED_URL") {
            config.shared_url = Some(v);
        }
        if let Some(v) = read_env("STRATAKV_DURABLE_URL") {
            config.durable_url = Some(v);
        }
        if let Some(v) = read_env("STRATAKV_BACKEND_TIMEOUT_MS") {
            config.backend_timeout_ms = parse_env("STRATAKV_BACKEND_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = read_env("STRATAKV_SHARED_RETRIES") {
            config.shared_retries = parse_env("STRATAKV_SHARED_RETRIES", &v)?;
        }
        if let Some(v) = read_env("STRATAKV_MEMORY_CAPACITY_BYTES") {
            config.memory_capacity_bytes = parse_env("STRATAKV_MEMORY_CAPACITY_BYTES", &v)?;
        }
        if let Some(v) = read_env("STRATAKV_WRITE_BEHIND") {
            config.durable_write_behind = parse_env("STRATAKV_WRITE_BEHIND", &v)?;
        }
        if let Some(v) = read_env("STRATAKV_DEFAULT_WINDOW_MS") {
            config.default_window_ms = parse_env("STRATAKV_DEFAULT_WINDOW_MS", &v)?;
        }
        if let Some(v) = read_env("STRATAKV_DEFAULT_MAX_REQUESTS") {
            config.default_max_requests = parse_env("STRATAKV_DEFAULT_MAX_REQUESTS", &v)?;
        }
        if let Some(v) = read_env("STRATAKV_CLEANUP_INTERVAL_SECS") {
            config.reaper.cleanup_interval_secs = parse_env("STRATAKV_CLEANUP_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = read_env("STRATAKV_AUDIT_RETENTION_SECS") {
            config.reaper.audit_retention_secs = parse_env("STRATAKV_AUDIT_RETENTION_SECS", &v)?;
        }

        Ok(config)
    }

    /// Per-call timeout as a `Duration`.
    pub fn backend_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.backend_timeout_ms)
    }
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("invalid value for {}: {:?}", name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.namespace, "stratakv");
        assert_eq!(config.backend_timeout_ms, 2_000);
        assert_eq!(config.shared_retries, 3);
        assert!(config.shared_enabled);
        assert!(config.durable_enabled);
        assert!(config.durable_write_behind);
        assert_eq!(config.default_ttl_secs, None);
        assert_eq!(config.reaper.cleanup_interval_secs, 60);
    }

    #[test]
    fn test_audit_retention_is_distinct_from_cleanup_interval() {
        let config = ReaperConfig::default();
        assert!(config.audit_retention_secs > config.cleanup_interval_secs);
    }

    #[test]
    fn test_parse_env_rejects_garbage() {
        let result: Result<u64> = parse_env("STRATAKV_BACKEND_TIMEOUT_MS", "not-a-number");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_serde_round_trip() {
        let config = StoreConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: StoreConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.namespace, config.namespace);
        assert_eq!(parsed.memory_capacity_bytes, config.memory_capacity_bytes);
    }

    #[test]
    fn test_from_env_defaults_when_unset() {
        // None of the STRATAKV_* variables are set in the test environment
        // for these two names; pick obscure ones to be safe.
        std::env::remove_var("STRATAKV_NAMESPACE");
        std::env::remove_var("STRATAKV_SHARED_RETRIES");
        let config = StoreConfig::from_env().unwrap();
        assert_eq!(config.shared_retries, 3);
    }
}
