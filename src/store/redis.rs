//! Shared tier — Redis backend
//!
//! Multi-node-visible cache tier. TTL is enforced natively by Redis at
//! write time. Every operation carries a bounded timeout and retry count;
//! a backend that stays unreachable yields `BackendUnavailable` rather
//! than blocking, and callers treat this tier as best-effort.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::debug;

use super::backend::{TierBackend, TierName};
use super::entry::Entry;
use crate::error::{Error, Result};

/// Redis tier settings.
#[derive(Debug, Clone)]
pub struct RedisTierConfig {
    /// Connection URL, e.g. `redis://127.0.0.1:6379`.
    pub url: String,
    /// Per-operation timeout.
    pub timeout: Duration,
    /// Attempts per operation before reporting the tier unavailable.
    /// The tiered store applies its own shared-tier retry budget, so this
    /// stays at 1 unless the tier is used standalone.
    pub retries: u32,
}

impl RedisTierConfig {
    /// Settings for the given URL with a 2s timeout and a single attempt.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(2),
            retries: 1,
        }
    }
}

/// Shared network tier backed by Redis.
pub struct RedisTier {
    manager: ConnectionManager,
    config: RedisTierConfig,
}

impl RedisTier {
    /// Connect to Redis. Fails with `BackendUnavailable` if the initial
    /// connection cannot be established.
    pub async fn connect(config: RedisTierConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| Error::unavailable("shared", e.to_string()))?;
        let manager = tokio::time::timeout(config.timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| Error::unavailable("shared", "connection timed out"))?
            .map_err(|e| Error::unavailable("shared", e.to_string()))?;
        debug!(url = %config.url, "connected shared tier");
        Ok(Self { manager, config })
    }

    /// Run `op` with the configured timeout, retrying up to the configured
    /// attempt count.
    async fn with_retries<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn(ConnectionManager) -> Fut,
        Fut: std::future::Future<Output = redis::RedisResult<T>>,
    {
        let attempts = self.config.retries.max(1);
        let mut last_err = String::new();

        for attempt in 0..attempts {
            match tokio::time::timeout(self.config.timeout, op(self.manager.clone())).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => last_err = e.to_string(),
                Err(_) => last_err = "operation timed out".to_string(),
            }
            debug!(attempt, error = %last_err, "shared tier operation failed");
        }

        Err(Error::unavailable("shared", last_err))
    }
}

#[async_trait]
impl TierBackend for RedisTier {
    fn name(&self) -> TierName {
        TierName::Shared
    }

    async fn get(&self, key: &str) -> Result<Option<Entry>> {
        let raw: Option<String> = self
            .with_retries(|mut conn| {
                let key = key.to_string();
                async move { conn.get(key).await }
            })
            .await?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, entry: Entry, ttl_seconds: Option<u64>) -> Result<()> {
        // A zero TTL means "written then instantly invisible"; Redis
        // rejects SETEX 0, so drop any stale copy instead.
        if ttl_seconds == Some(0) {
            self.delete(key).await?;
            return Ok(());
        }

        let json = serde_json::to_string(&entry)?;
        self.with_retries(|mut conn| {
            let key = key.to_string();
            let json = json.clone();
            async move {
                match ttl_seconds {
                    Some(ttl) => conn.set_ex::<_, _, ()>(key, json, ttl).await,
                    None => conn.set::<_, _, ()>(key, json).await,
                }
            }
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let removed: i64 = self
            .with_retries(|mut conn| {
                let key = key.to_string();
                async move { conn.del(key).await }
            })
            .await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.with_retries(|mut conn| {
            let key = key.to_string();
            async move { conn.exists(key).await }
        })
        .await
    }

    async fn keys_matching(&self, prefix: &str) -> Result<Vec<String>> {
        let pattern = format!("{}*", prefix);
        self.with_retries(|mut conn| {
            let pattern = pattern.clone();
            async move { conn.keys(pattern).await }
        })
        .await
    }

    // TTL is native here; the reaper has nothing to purge.
}
