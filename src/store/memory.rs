//! In-process tier
//!
//! Fastest tier: a concurrent map local to this process. Volatile (lost on
//! restart), enforces TTL lazily on read and periodically via the reaper.
//! Capacity pressure triggers score-based eviction between high and low
//! watermarks.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use super::backend::{TierBackend, TierName};
use super::entry::Entry;
use crate::error::Result;

/// In-process tier configuration.
#[derive(Debug, Clone)]
pub struct MemoryTierConfig {
    /// Maximum capacity in bytes.
    pub capacity_bytes: u64,
    /// Start evicting at this fill fraction.
    pub high_watermark: f64,
    /// Stop evicting at this fill fraction.
    pub low_watermark: f64,
}

impl Default for MemoryTierConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: 256 * 1024 * 1024,
            high_watermark: 0.90,
            low_watermark: 0.80,
        }
    }
}

/// In-process map tier.
///
/// Normally serves the memory slot, but can stand in for the shared or
/// durable slot in single-process deployments and tests (the same pattern
/// as an in-memory cold-storage backend).
pub struct MemoryTier {
    storage: DashMap<String, Entry>,
    config: MemoryTierConfig,
    tier: TierName,
    current_bytes: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl MemoryTier {
    /// Create with default configuration.
    pub fn new() -> Self {
        Self::with_config(MemoryTierConfig::default())
    }

    /// Create with custom configuration.
    pub fn with_config(config: MemoryTierConfig) -> Self {
        Self {
            storage: DashMap::new(),
            config,
            tier: TierName::Memory,
            current_bytes: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Create an in-memory backend serving a different tier slot.
    pub fn for_tier(tier: TierName) -> Self {
        let mut this = Self::new();
        this.tier = tier;
        this
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// True when no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Bytes currently held.
    pub fn size_bytes(&self) -> u64 {
        self.current_bytes.load(Ordering::Relaxed)
    }

    /// Hit count.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Miss count.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Eviction count.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Remove everything.
    pub fn clear(&self) {
        self.storage.clear();
        self.current_bytes.store(0, Ordering::Relaxed);
    }

    /// Scan and remove expired entries. Returns the number removed.
    /// Called by the reaper; reads also drop expired entries lazily.
    pub fn purge_expired_entries(&self) -> u64 {
        let expired: Vec<String> = self
            .storage
            .iter()
            .filter(|item| item.value().is_expired())
            .map(|item| item.key().clone())
            .collect();

        let mut purged = 0;
        for key in expired {
            if let Some((_, entry)) = self.storage.remove(&key) {
                self.current_bytes
                    .fetch_sub(entry.size(), Ordering::Relaxed);
                purged += 1;
            }
        }
        purged
    }

    fn should_evict(&self) -> bool {
        let current = self.current_bytes.load(Ordering::Relaxed) as f64;
        current / self.config.capacity_bytes as f64 >= self.config.high_watermark
    }

    fn above_low_watermark(&self) -> bool {
        let current = self.current_bytes.load(Ordering::Relaxed) as f64;
        current / self.config.capacity_bytes as f64 > self.config.low_watermark
    }

    /// Evict entries until the low watermark is reached. Expired entries
    /// go first, then highest eviction score (old and rarely read).
    fn evict(&self) {
        let mut candidates: Vec<(String, f64, u64)> = self
            .storage
            .iter()
            .map(|item| {
                let entry = item.value();
                let score = if entry.is_expired() {
                    f64::MAX
                } else {
                    entry.eviction_score()
                };
                (item.key().clone(), score, entry.size())
            })
            .collect();

        candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        for (key, _, size) in candidates {
            if !self.above_low_watermark() {
                break;
            }
            if self.storage.remove(&key).is_some() {
                self.current_bytes.fetch_sub(size, Ordering::Relaxed);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl Default for MemoryTier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TierBackend for MemoryTier {
    fn name(&self) -> TierName {
        self.tier
    }

    async fn get(&self, key: &str) -> Result<Option<Entry>> {
        // Lazy TTL: drop expired entries on read.
        let expired = match self.storage.get(key) {
            Some(item) => item.value().is_expired(),
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            }
        };

        if expired {
            if let Some((_, entry)) = self.storage.remove(key) {
                self.current_bytes
                    .fetch_sub(entry.size(), Ordering::Relaxed);
            }
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }

        match self.storage.get_mut(key) {
            Some(mut item) => {
                item.value_mut().record_access();
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(item.value().clone()))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, entry: Entry, _ttl_seconds: Option<u64>) -> Result<()> {
        if self.should_evict() {
            self.evict();
        }

        let size = entry.size();
        match self.storage.insert(key.to_string(), entry) {
            Some(old) => {
                let old_size = old.size();
                if size >= old_size {
                    self.current_bytes
                        .fetch_add(size - old_size, Ordering::Relaxed);
                } else {
                    self.current_bytes
                        .fetch_sub(old_size - size, Ordering::Relaxed);
                }
            }
            None => {
                self.current_bytes.fetch_add(size, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        match self.storage.remove(key) {
            Some((_, entry)) => {
                self.current_bytes
                    .fetch_sub(entry.size(), Ordering::Relaxed);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        match self.storage.get(key) {
            Some(item) => Ok(!item.value().is_expired()),
            None => Ok(false),
        }
    }

    async fn keys_matching(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .storage
            .iter()
            .filter(|item| item.key().starts_with(prefix))
            .map(|item| item.key().clone())
            .collect())
    }

    async fn purge_expired(&self, _audit_retention_secs: u64) -> Result<u64> {
        Ok(self.purge_expired_entries())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn make_entry(data: &[u8]) -> Entry {
        Entry::new(Bytes::copy_from_slice(data))
    }

    #[tokio::test]
    async fn test_memory_tier_put_get() {
        let tier = MemoryTier::new();

        tier.set("user:1", make_entry(b"alice"), None).await.unwrap();
        assert_eq!(tier.len(), 1);
        assert_eq!(tier.size_bytes(), 5);

        let entry = tier.get("user:1").await.unwrap().unwrap();
        assert_eq!(entry.value.as_ref(), b"alice");
        assert_eq!(entry.access_count, 1);
        assert_eq!(tier.hits(), 1);
    }

    #[tokio::test]
    async fn test_memory_tier_miss() {
        let tier = MemoryTier::new();
        assert!(tier.get("absent").await.unwrap().is_none());
        assert_eq!(tier.misses(), 1);
    }

    #[tokio::test]
    async fn test_memory_tier_replace_updates_size() {
        let tier = MemoryTier::new();

        tier.set("k", make_entry(b"original"), None).await.unwrap();
        assert_eq!(tier.size_bytes(), 8);

        tier.set("k", make_entry(b"replaced content"), None)
            .await
            .unwrap();
        assert_eq!(tier.len(), 1);
        assert_eq!(tier.size_bytes(), 16);
    }

    #[tokio::test]
    async fn test_memory_tier_delete() {
        let tier = MemoryTier::new();

        tier.set("k", make_entry(b"data"), None).await.unwrap();
        assert!(tier.delete("k").await.unwrap());
        assert!(!tier.delete("k").await.unwrap());
        assert_eq!(tier.size_bytes(), 0);
    }

    #[tokio::test]
    async fn test_memory_tier_expired_entry_invisible_on_read() {
        let tier = MemoryTier::new();

        tier.set("gone", Entry::with_ttl(Bytes::from_static(b"x"), 0), Some(0))
            .await
            .unwrap();

        // Written, then instantly invisible.
        assert!(tier.get("gone").await.unwrap().is_none());
        assert!(!tier.exists("gone").await.unwrap());
        // Lazy removal reclaimed the bytes.
        assert_eq!(tier.size_bytes(), 0);
    }

    #[tokio::test]
    async fn test_memory_tier_purge_expired() {
        let tier = MemoryTier::new();

        tier.set("live", make_entry(b"data"), None).await.unwrap();
        tier.set("dead1", Entry::with_ttl(Bytes::from_static(b"x"), 0), Some(0))
            .await
            .unwrap();
        tier.set("dead2", Entry::with_ttl(Bytes::from_static(b"y"), 0), Some(0))
            .await
            .unwrap();

        let purged = tier.purge_expired_entries();
        assert_eq!(purged, 2);
        assert_eq!(tier.len(), 1);
        assert!(tier.exists("live").await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_tier_keys_matching() {
        let tier = MemoryTier::new();

        tier.set("user:1", make_entry(b"a"), None).await.unwrap();
        tier.set("user:2", make_entry(b"b"), None).await.unwrap();
        tier.set("session:1", make_entry(b"c"), None).await.unwrap();

        let mut keys = tier.keys_matching("user:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["user:1", "user:2"]);

        let all = tier.keys_matching("").await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_memory_tier_eviction_under_pressure() {
        let tier = MemoryTier::with_config(MemoryTierConfig {
            capacity_bytes: 1000,
            high_watermark: 0.80,
            low_watermark: 0.50,
        });

        for i in 0..20 {
            let key = format!("obj-{}", i);
            tier.set(&key, make_entry(&[i as u8; 100]), None)
                .await
                .unwrap();
        }

        assert!(tier.size_bytes() < 1000);
        assert!(tier.evictions() > 0);
    }

    #[tokio::test]
    async fn test_memory_tier_concurrent_access() {
        use std::sync::Arc;
        use tokio::task::JoinSet;

        let tier = Arc::new(MemoryTier::new());
        let mut join_set = JoinSet::new();

        for t in 0..8 {
            let tier = Arc::clone(&tier);
            join_set.spawn(async move {
                for i in 0..200 {
                    let key = format!("obj-{}-{}", t, i);
                    tier.set(&key, make_entry(&[0u8; 16]), None).await.unwrap();
                    assert!(tier.get(&key).await.unwrap().is_some());
                }
            });
        }

        while let Some(result) = join_set.join_next().await {
            result.unwrap();
        }

        assert_eq!(tier.len(), 1600);
    }
}
