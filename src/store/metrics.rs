//! Store metrics collection
//!
//! Lightweight atomic counters per tier, surfaced through
//! [`TieredStore::stats`](super::TieredStore::stats).

use std::sync::atomic::{AtomicU64, Ordering};

use super::backend::TierName;

/// Counters for one tier.
#[derive(Debug, Default)]
pub struct TierCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    errors: AtomicU64,
}

impl TierCounters {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> TierStats {
        TierStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Metrics collector for the whole store.
#[derive(Debug, Default)]
pub struct StoreMetrics {
    memory: TierCounters,
    shared: TierCounters,
    durable: TierCounters,
}

impl StoreMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters for the named tier.
    pub fn tier(&self, tier: TierName) -> &TierCounters {
        match tier {
            TierName::Memory => &self.memory,
            TierName::Shared => &self.shared,
            TierName::Durable => &self.durable,
        }
    }

    /// Point-in-time snapshot of all counters.
    pub fn snapshot(&self) -> StoreStats {
        StoreStats {
            memory: self.memory.snapshot(),
            shared: self.shared.snapshot(),
            durable: self.durable.snapshot(),
            memory_entries: 0,
            memory_bytes: 0,
        }
    }
}

/// Immutable snapshot of one tier's counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct TierStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub errors: u64,
}

impl TierStats {
    /// Hit ratio (0.0 - 1.0).
    pub fn hit_ratio(&self) -> f64 {
        let total = (self.hits + self.misses) as f64;
        if total == 0.0 {
            0.0
        } else {
            self.hits as f64 / total
        }
    }
}

/// Snapshot returned by `TieredStore::stats`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreStats {
    pub memory: TierStats,
    pub shared: TierStats,
    pub durable: TierStats,
    /// Live entries in the in-process tier.
    pub memory_entries: usize,
    /// Bytes held by the in-process tier.
    pub memory_bytes: u64,
}
