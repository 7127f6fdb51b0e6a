//! Tier backend abstraction
//!
//! One capability set implemented by all three storage tiers. A backend
//! reports `BackendUnavailable` only when it cannot be reached; a missing
//! key is `Ok(None)`.

use async_trait::async_trait;

use super::entry::Entry;
use crate::error::Result;

/// Identifies one tier in the fallback chain, fastest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TierName {
    /// In-process map: fastest, volatile, single-node
    Memory,
    /// Shared network cache: multi-node, TTL-native, best-effort
    Shared,
    /// Durable relational store: authoritative, slowest
    Durable,
}

impl TierName {
    /// Read/write ordering across the chain.
    pub const ORDERED: [TierName; 3] = [TierName::Memory, TierName::Shared, TierName::Durable];

    /// Lowercase label for logging and error messages.
    pub fn label(&self) -> &'static str {
        match self {
            TierName::Memory => "memory",
            TierName::Shared => "shared",
            TierName::Durable => "durable",
        }
    }
}

impl std::fmt::Display for TierName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Storage engine behind one tier.
#[async_trait]
pub trait TierBackend: Send + Sync {
    /// Which tier this backend serves.
    fn name(&self) -> TierName;

    /// Fetch an entry. `Ok(None)` for a miss.
    async fn get(&self, key: &str) -> Result<Option<Entry>>;

    /// Store an entry. `ttl_seconds` mirrors `entry.ttl_seconds` so
    /// TTL-native backends can apply it at write time.
    async fn set(&self, key: &str, entry: Entry, ttl_seconds: Option<u64>) -> Result<()>;

    /// Remove an entry. `Ok(true)` if something was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Check presence without touching access stats.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Keys starting with `prefix`. An empty prefix matches every key.
    /// The durable tier emulates this with a range query.
    async fn keys_matching(&self, prefix: &str) -> Result<Vec<String>>;

    /// Reaper hook: purge rows past their TTL, plus audit-style rows older
    /// than `audit_retention_secs`. Returns the number purged. TTL-native
    /// backends have nothing to do.
    async fn purge_expired(&self, _audit_retention_secs: u64) -> Result<u64> {
        Ok(0)
    }
}
