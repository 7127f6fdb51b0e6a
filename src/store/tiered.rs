//! Tiered Store - Unified Three-Tier Orchestration
//!
//! Composes the in-process, shared, and durable tiers into one logical
//! store. Reads walk memory → shared → durable and backfill the faster
//! tiers on a hit (read-through); writes fan out to every enabled tier
//! (write-through). A backend error at one tier never fails the overall
//! call: lookups degrade to a miss for that tier, writes report which
//! tiers actually committed.
//!
//! # Consistency
//!
//! No linearizability is guaranteed. Concurrent callers may interleave
//! arbitrarily across tiers; the store is "mostly recent, eventually
//! consistent across tiers", which suits caching and best-effort rate
//! limiting but nothing stronger.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::backend::{TierBackend, TierName};
use super::entry::Entry;
use super::memory::{MemoryTier, MemoryTierConfig};
use super::metrics::{StoreMetrics, StoreStats};
use super::writeback::{WriteBehind, WriteJob};
use crate::config::StoreConfig;
use crate::error::{Error, Result};

/// Which tiers acknowledged a write.
///
/// `set` succeeds once the in-process tier holds the value; the other
/// tiers are best-effort. Callers that need durability check `committed`
/// (or `queued`, for writes handed to the write-behind worker) instead of
/// assuming success.
#[derive(Debug, Clone, Default)]
pub struct WriteOutcome {
    /// Tiers that acknowledged the write synchronously.
    pub committed: Vec<TierName>,
    /// Tiers the write was queued for (write-behind).
    pub queued: Vec<TierName>,
}

impl WriteOutcome {
    /// True when the named tier committed synchronously.
    pub fn committed_to(&self, tier: TierName) -> bool {
        self.committed.contains(&tier)
    }

    /// True when the durable tier holds or will hold the write.
    pub fn reached_durable(&self) -> bool {
        self.committed_to(TierName::Durable) || self.queued.contains(&TierName::Durable)
    }
}

/// Builder for a [`TieredStore`].
pub struct StoreBuilder {
    config: StoreConfig,
    shared: Option<Arc<dyn TierBackend>>,
    durable: Option<Arc<dyn TierBackend>>,
}

impl StoreBuilder {
    fn new() -> Self {
        Self {
            config: StoreConfig::default(),
            shared: None,
            durable: None,
        }
    }

    /// Use the given configuration.
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Attach a shared-tier backend.
    pub fn shared(mut self, backend: Arc<dyn TierBackend>) -> Self {
        self.shared = Some(backend);
        self
    }

    /// Attach a durable-tier backend.
    pub fn durable(mut self, backend: Arc<dyn TierBackend>) -> Self {
        self.durable = Some(backend);
        self
    }

    /// Assemble the store. Tiers disabled in the configuration are ignored
    /// even when a backend was supplied.
    pub fn build(self) -> TieredStore {
        let memory = Arc::new(MemoryTier::with_config(MemoryTierConfig {
            capacity_bytes: self.config.memory_capacity_bytes,
            ..MemoryTierConfig::default()
        }));

        let shared = self.shared.filter(|_| self.config.shared_enabled);
        let durable = self.durable.filter(|_| self.config.durable_enabled);

        let metrics = Arc::new(StoreMetrics::new());
        let writeback = match (&durable, self.config.durable_write_behind) {
            (Some(backend), true) => Some(WriteBehind::spawn(
                Arc::clone(backend),
                self.config.write_behind_depth,
                Arc::clone(&metrics),
            )),
            _ => None,
        };

        TieredStore {
            config: self.config,
            memory,
            shared,
            durable,
            writeback,
            metrics,
            shutdown_token: CancellationToken::new(),
            shut_down: AtomicBool::new(false),
        }
    }
}

/// The composed three-tier store.
pub struct TieredStore {
    config: StoreConfig,
    memory: Arc<MemoryTier>,
    shared: Option<Arc<dyn TierBackend>>,
    durable: Option<Arc<dyn TierBackend>>,
    writeback: Option<WriteBehind>,
    metrics: Arc<StoreMetrics>,
    shutdown_token: CancellationToken,
    shut_down: AtomicBool,
}

impl TieredStore {
    /// Start building a store.
    pub fn builder() -> StoreBuilder {
        StoreBuilder::new()
    }

    /// Memory-only store with default configuration (for tests and
    /// single-process setups).
    pub fn in_memory() -> Self {
        Self::builder().build()
    }

    /// The active configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Cancellation token observed by background tasks tied to this store.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Direct access to the in-process tier.
    pub fn memory(&self) -> &MemoryTier {
        &self.memory
    }

    fn namespaced(&self, key: &str) -> String {
        if self.config.namespace.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.config.namespace, key)
        }
    }

    /// Resolve the effective TTL: missing falls back to the configured
    /// default, zero or negative expires immediately.
    fn normalize_ttl(&self, ttl_seconds: Option<i64>) -> Option<u64> {
        match ttl_seconds {
            Some(ttl) if ttl <= 0 => Some(0),
            Some(ttl) => Some(ttl as u64),
            None => self.config.default_ttl_secs,
        }
    }

    /// Run a slow-tier call under the per-call timeout; a timeout reads
    /// the same as an unreachable backend.
    async fn bounded<T, F>(&self, tier: TierName, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.config.backend_timeout(), fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::unavailable(tier.label(), "operation timed out")),
        }
    }

    async fn shared_get(&self, backend: &Arc<dyn TierBackend>, key: &str) -> Result<Option<Entry>> {
        let attempts = self.config.shared_retries.max(1);
        let mut last = Error::unavailable("shared", "no attempts made");
        for _ in 0..attempts {
            match self.bounded(TierName::Shared, backend.get(key)).await {
                Ok(found) => return Ok(found),
                Err(e) => last = e,
            }
        }
        Err(last)
    }

    async fn shared_set(&self, backend: &Arc<dyn TierBackend>, key: &str, entry: &Entry) -> Result<()> {
        let attempts = self.config.shared_retries.max(1);
        let mut last = Error::unavailable("shared", "no attempts made");
        for _ in 0..attempts {
            let result = self
                .bounded(
                    TierName::Shared,
                    backend.set(key, entry.clone(), entry.ttl_seconds),
                )
                .await;
            match result {
                Ok(()) => return Ok(()),
                Err(e) => last = e,
            }
        }
        Err(last)
    }

    /// Read through the chain. Returns the full entry; a backend error at
    /// any tier is logged and treated as a miss for that tier.
    pub async fn get_entry(&self, key: &str) -> Option<Entry> {
        let k = self.namespaced(key);

        // Memory first. The memory tier records access stats itself.
        match self.memory.get(&k).await {
            Ok(Some(entry)) => {
                self.metrics.tier(TierName::Memory).record_hit();
                return Some(entry);
            }
            Ok(None) => self.metrics.tier(TierName::Memory).record_miss(),
            Err(e) => {
                self.metrics.tier(TierName::Memory).record_error();
                warn!(key, error = %e, "memory tier read failed");
            }
        }

        if let Some(shared) = &self.shared {
            match self.shared_get(shared, &k).await {
                Ok(Some(mut entry)) => {
                    self.metrics.tier(TierName::Shared).record_hit();
                    entry.record_access();
                    self.backfill(&k, &entry, &[TierName::Memory]).await;
                    return Some(entry);
                }
                Ok(None) => self.metrics.tier(TierName::Shared).record_miss(),
                Err(e) => {
                    self.metrics.tier(TierName::Shared).record_error();
                    warn!(key, error = %e, "shared tier read failed, treating as miss");
                }
            }
        }

        if let Some(durable) = &self.durable {
            match self.bounded(TierName::Durable, durable.get(&k)).await {
                Ok(Some(mut entry)) => {
                    self.metrics.tier(TierName::Durable).record_hit();
                    entry.record_access();
                    self.backfill(&k, &entry, &[TierName::Memory, TierName::Shared])
                        .await;
                    return Some(entry);
                }
                Ok(None) => self.metrics.tier(TierName::Durable).record_miss(),
                Err(e) => {
                    self.metrics.tier(TierName::Durable).record_error();
                    warn!(key, error = %e, "durable tier read failed, treating as miss");
                }
            }
        }

        None
    }

    /// Write a hit back into the faster tiers. Best-effort.
    async fn backfill(&self, k: &str, entry: &Entry, tiers: &[TierName]) {
        for tier in tiers {
            match tier {
                TierName::Memory => {
                    // Infallible in practice; keep the entry's absolute
                    // deadline by copying it as-is.
                    let _ = self.memory.set(k, entry.clone(), entry.ttl_seconds).await;
                }
                TierName::Shared => {
                    if let Some(shared) = &self.shared {
                        if let Err(e) = self.shared_set(shared, k, entry).await {
                            debug!(key = k, error = %e, "shared backfill skipped");
                        }
                    }
                }
                TierName::Durable => {}
            }
        }
    }

    /// Fetch the raw value bytes.
    pub async fn get(&self, key: &str) -> Option<Bytes> {
        self.get_entry(key).await.map(|entry| entry.value)
    }

    /// Fetch and JSON-decode a value. Decoding failures surface as
    /// `Serialization` errors rather than being dropped.
    pub async fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn write_through(&self, k: &str, entry: Entry) -> WriteOutcome {
        let mut outcome = WriteOutcome::default();

        // In-process write is the acknowledgement point.
        if self.memory.set(k, entry.clone(), entry.ttl_seconds).await.is_ok() {
            self.metrics.tier(TierName::Memory).record_set();
            outcome.committed.push(TierName::Memory);
        }

        if let Some(shared) = &self.shared {
            match self.shared_set(shared, k, &entry).await {
                Ok(()) => {
                    self.metrics.tier(TierName::Shared).record_set();
                    outcome.committed.push(TierName::Shared);
                }
                Err(e) => {
                    self.metrics.tier(TierName::Shared).record_error();
                    warn!(key = k, error = %e, "shared tier write failed");
                }
            }
        }

        if let Some(durable) = &self.durable {
            let queued = self.writeback.as_ref().is_some_and(|wb| {
                wb.try_enqueue(WriteJob::Set {
                    key: k.to_string(),
                    entry: entry.clone(),
                    ttl_seconds: entry.ttl_seconds,
                })
            });

            if queued {
                self.metrics.tier(TierName::Durable).record_set();
                outcome.queued.push(TierName::Durable);
            } else {
                // No write-behind (or the queue is saturated): write inline.
                let result = self
                    .bounded(
                        TierName::Durable,
                        durable.set(k, entry.clone(), entry.ttl_seconds),
                    )
                    .await;
                match result {
                    Ok(()) => {
                        self.metrics.tier(TierName::Durable).record_set();
                        outcome.committed.push(TierName::Durable);
                    }
                    Err(e) => {
                        self.metrics.tier(TierName::Durable).record_error();
                        warn!(key = k, error = %e, "durable tier write failed");
                    }
                }
            }
        }

        outcome
    }

    /// Store a value across all enabled tiers (write-through).
    pub async fn set(
        &self,
        key: &str,
        value: impl Into<Bytes>,
        ttl_seconds: Option<i64>,
        metadata: Option<HashMap<String, serde_json::Value>>,
    ) -> WriteOutcome {
        let k = self.namespaced(key);
        let mut entry = Entry::new(value.into());
        entry.ttl_seconds = self.normalize_ttl(ttl_seconds);
        if let Some(metadata) = metadata {
            entry.metadata = metadata;
        }
        self.write_through(&k, entry).await
    }

    /// JSON-encode and store a value.
    pub async fn set_json<T: serde::Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl_seconds: Option<i64>,
    ) -> Result<WriteOutcome> {
        let bytes = serde_json::to_vec(value)?;
        Ok(self.set(key, bytes, ttl_seconds, None).await)
    }

    /// Delete from every tier. True if at least one tier removed the key.
    pub async fn delete(&self, key: &str) -> bool {
        let k = self.namespaced(key);
        let mut removed = false;

        match self.memory.delete(&k).await {
            Ok(true) => {
                self.metrics.tier(TierName::Memory).record_delete();
                removed = true;
            }
            Ok(false) => {}
            Err(e) => warn!(key, error = %e, "memory tier delete failed"),
        }

        if let Some(shared) = &self.shared {
            match self.bounded(TierName::Shared, shared.delete(&k)).await {
                Ok(true) => {
                    self.metrics.tier(TierName::Shared).record_delete();
                    removed = true;
                }
                Ok(false) => {}
                Err(e) => {
                    self.metrics.tier(TierName::Shared).record_error();
                    warn!(key, error = %e, "shared tier delete failed");
                }
            }
        }

        if let Some(durable) = &self.durable {
            let mut queued = false;
            if let Some(wb) = &self.writeback {
                // The queue applies the delete later, so sample existence
                // now: the return value must still reflect a copy that
                // only the durable tier held.
                let existed = matches!(
                    self.bounded(TierName::Durable, durable.exists(&k)).await,
                    Ok(true)
                );
                if wb.try_enqueue(WriteJob::Delete { key: k.clone() }) {
                    self.metrics.tier(TierName::Durable).record_delete();
                    if existed {
                        removed = true;
                    }
                    queued = true;
                }
            }
            if !queued {
                match self.bounded(TierName::Durable, durable.delete(&k)).await {
                    Ok(true) => {
                        self.metrics.tier(TierName::Durable).record_delete();
                        removed = true;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        self.metrics.tier(TierName::Durable).record_error();
                        warn!(key, error = %e, "durable tier delete failed");
                    }
                }
            }
        }

        removed
    }

    /// Presence check, short-circuiting on the first tier that has the key.
    pub async fn exists(&self, key: &str) -> bool {
        let k = self.namespaced(key);

        if matches!(self.memory.exists(&k).await, Ok(true)) {
            return true;
        }
        if let Some(shared) = &self.shared {
            if matches!(self.bounded(TierName::Shared, shared.exists(&k)).await, Ok(true)) {
                return true;
            }
        }
        if let Some(durable) = &self.durable {
            if matches!(self.bounded(TierName::Durable, durable.exists(&k)).await, Ok(true)) {
                return true;
            }
        }
        false
    }

    /// Batch read: repeated single-key lookups, no cross-key atomicity.
    pub async fn mget(&self, keys: &[&str]) -> HashMap<String, Bytes> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.get(key).await {
                found.insert((*key).to_string(), value);
            }
        }
        found
    }

    /// Batch write: repeated single-key writes, no cross-key atomicity.
    pub async fn mset(
        &self,
        entries: impl IntoIterator<Item = (String, Bytes)>,
        ttl_seconds: Option<i64>,
    ) -> Vec<WriteOutcome> {
        let mut outcomes = Vec::new();
        for (key, value) in entries {
            outcomes.push(self.set(&key, value, ttl_seconds, None).await);
        }
        outcomes
    }

    /// Add `amount` to a numeric value, creating it at zero when absent.
    /// The result saturates at the `i64` bounds.
    ///
    /// This is a read-modify-write with no compare-and-swap: concurrent
    /// callers incrementing the same key can lose updates. Callers that
    /// need exact counts must serialize access themselves.
    pub async fn increment(&self, key: &str, amount: i64) -> Result<i64> {
        let existing = self.get_entry(key).await;

        let current: i64 = match &existing {
            Some(entry) => serde_json::from_slice(&entry.value)?,
            None => 0,
        };
        // Clamp at the i64 bounds instead of wrapping.
        let next = current.saturating_add(amount);

        let k = self.namespaced(key);
        let mut entry = Entry::new(Bytes::from(next.to_string()));
        if let Some(previous) = existing {
            // Preserve the original deadline and provenance.
            entry.ttl_seconds = previous.ttl_seconds;
            entry.created_at = previous.created_at;
            entry.metadata = previous.metadata;
        } else {
            entry.ttl_seconds = self.normalize_ttl(None);
        }

        self.write_through(&k, entry).await;
        Ok(next)
    }

    /// Seconds until expiry, or -1 when the key is absent or carries no TTL.
    pub async fn ttl(&self, key: &str) -> i64 {
        match self.get_entry(key).await {
            Some(entry) => match entry.ttl_remaining() {
                Some(remaining) => remaining as i64,
                None => -1,
            },
            None => -1,
        }
    }

    /// Delete all keys, optionally scoped to a prefix, across every tier.
    /// Unrelated namespaces in the shared/durable backends are untouched.
    pub async fn clear(&self, prefix: Option<&str>) {
        let scope = self.namespaced(prefix.unwrap_or(""));

        for backend in self.tier_iter() {
            let tier = backend.name();
            let keys = match self.bounded(tier, backend.keys_matching(&scope)).await {
                Ok(keys) => keys,
                Err(e) => {
                    self.metrics.tier(tier).record_error();
                    warn!(tier = %tier, error = %e, "clear: key scan failed");
                    continue;
                }
            };
            for key in keys {
                if let Err(e) = self.bounded(tier, backend.delete(&key)).await {
                    warn!(tier = %tier, key, error = %e, "clear: delete failed");
                }
            }
        }
    }

    fn tier_iter(&self) -> impl Iterator<Item = &dyn TierBackend> {
        let memory: &dyn TierBackend = self.memory.as_ref();
        [
            Some(memory),
            self.shared.as_deref(),
            self.durable.as_deref(),
        ]
        .into_iter()
        .flatten()
    }

    /// Point-in-time counters for every tier.
    pub fn stats(&self) -> StoreStats {
        let mut stats = self.metrics.snapshot();
        stats.memory_entries = self.memory.len();
        stats.memory_bytes = self.memory.size_bytes();
        stats
    }

    /// Reaper entry point: purge expired in-process entries and durable
    /// rows past retention. Returns the total purged.
    pub async fn purge_expired(&self) -> u64 {
        let mut purged = self.memory.purge_expired_entries();

        if let Some(durable) = &self.durable {
            let retention = self.config.reaper.audit_retention_secs;
            match self.bounded(TierName::Durable, durable.purge_expired(retention)).await {
                Ok(count) => purged += count,
                Err(e) => {
                    self.metrics.tier(TierName::Durable).record_error();
                    warn!(error = %e, "durable retention sweep failed");
                }
            }
        }

        purged
    }

    /// Graceful shutdown: cancel background tasks tied to this store and
    /// flush the durable write-behind queue. Idempotent.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("shutting down tiered store");
        self.shutdown_token.cancel();
        if let Some(writeback) = &self.writeback {
            writeback.flush_and_stop().await;
        }
    }

    /// True once `shutdown` has run.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}
