//! Tiered Key-Value Store
//!
//! Three storage tiers behind one interface:
//! - Memory: in-process concurrent map, sub-microsecond access
//! - Shared: network cache reachable by every process (Redis)
//! - Durable: relational store that survives restarts (PostgreSQL)
//!
//! [`TieredStore`] orchestrates them with read-through and write-through
//! semantics; each backend implements [`TierBackend`] and can be swapped
//! or disabled independently.

pub mod backend;
pub mod entry;
pub mod memory;
pub mod metrics;
#[cfg(feature = "postgres-tier")]
pub mod postgres;
#[cfg(feature = "redis-tier")]
pub mod redis;
pub mod testing;
pub mod tiered;
mod writeback;

pub use backend::{TierBackend, TierName};
pub use entry::Entry;
pub use memory::{MemoryTier, MemoryTierConfig};
pub use metrics::{StoreStats, TierStats};
#[cfg(feature = "postgres-tier")]
pub use postgres::{PostgresTier, PostgresTierConfig};
#[cfg(feature = "redis-tier")]
pub use redis::{RedisTier, RedisTierConfig};
pub use tiered::{StoreBuilder, TieredStore, WriteOutcome};
