//! Entry Record Model
//!
//! The value+metadata envelope stored at every tier. Entries carry their
//! own TTL and access statistics so any tier can answer expiry questions
//! without consulting the others.

use std::collections::HashMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Current wall-clock time as epoch seconds.
pub(crate) fn now_epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// A stored value and its metadata.
///
/// `created_at` is set once and never mutated; `last_accessed_at` and
/// `access_count` are updated on every successful read. An absent
/// `ttl_seconds` means the entry never expires by age (a tier may still
/// evict it under memory pressure, which is a backend concern).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    /// Opaque value bytes. Callers serialize at the store boundary.
    pub value: Bytes,
    /// TTL in seconds. `Some(0)` expires immediately.
    pub ttl_seconds: Option<u64>,
    /// Creation timestamp (epoch seconds), immutable after creation.
    pub created_at: u64,
    /// Last successful read (epoch seconds).
    pub last_accessed_at: u64,
    /// Number of successful reads.
    pub access_count: u64,
    /// Arbitrary caller-supplied tags.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Entry {
    /// Create a new entry with no TTL.
    pub fn new(value: Bytes) -> Self {
        let now = now_epoch_secs();
        Self {
            value,
            ttl_seconds: None,
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
            metadata: HashMap::new(),
        }
    }

    /// Create a new entry with a TTL in seconds.
    pub fn with_ttl(value: Bytes, ttl_seconds: u64) -> Self {
        let mut entry = Self::new(value);
        entry.ttl_seconds = Some(ttl_seconds);
        entry
    }

    /// Attach caller metadata.
    pub fn with_metadata(mut self, metadata: HashMap<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Value size in bytes.
    #[inline]
    pub fn size(&self) -> u64 {
        self.value.len() as u64
    }

    /// Epoch second at which this entry expires, if it has a TTL.
    #[inline]
    pub fn expires_at(&self) -> Option<u64> {
        self.ttl_seconds.map(|ttl| self.created_at.saturating_add(ttl))
    }

    /// Check expiry against the current clock.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_epoch_secs())
    }

    /// Check expiry against a supplied clock (epoch seconds).
    #[inline]
    pub fn is_expired_at(&self, now: u64) -> bool {
        match self.expires_at() {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }

    /// Seconds until expiry: `Some(remaining)` for live TTL entries,
    /// `None` when the entry carries no TTL.
    pub fn ttl_remaining(&self) -> Option<u64> {
        let deadline = self.expires_at()?;
        Some(deadline.saturating_sub(now_epoch_secs()))
    }

    /// Record a successful read.
    pub fn record_access(&mut self) {
        self.last_accessed_at = now_epoch_secs();
        self.access_count = self.access_count.saturating_add(1);
    }

    /// Eviction score for the in-process tier: age since last access
    /// divided by access frequency. Higher scores evict first.
    pub fn eviction_score(&self) -> f64 {
        let age = now_epoch_secs().saturating_sub(self.last_accessed_at) as f64;
        age / (self.access_count as f64 + 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_entry(data: &[u8]) -> Entry {
        Entry::new(Bytes::copy_from_slice(data))
    }

    #[test]
    fn test_entry_creation() {
        let entry = make_entry(b"Hello, World!");
        assert_eq!(entry.size(), 13);
        assert_eq!(entry.access_count, 0);
        assert_eq!(entry.ttl_seconds, None);
        assert!(!entry.is_expired());
        assert_eq!(entry.created_at, entry.last_accessed_at);
    }

    #[test]
    fn test_entry_without_ttl_never_expires() {
        let entry = make_entry(b"immortal");
        // Far future clock
        assert!(!entry.is_expired_at(entry.created_at + 10_000_000));
        assert_eq!(entry.ttl_remaining(), None);
    }

    #[test]
    fn test_entry_ttl_expiry_boundaries() {
        let entry = Entry::with_ttl(Bytes::from_static(b"data"), 10);
        assert!(!entry.is_expired_at(entry.created_at + 9));
        assert!(entry.is_expired_at(entry.created_at + 10));
        assert!(entry.is_expired_at(entry.created_at + 11));
    }

    #[test]
    fn test_zero_ttl_expires_immediately() {
        let entry = Entry::with_ttl(Bytes::from_static(b"gone"), 0);
        assert!(entry.is_expired_at(entry.created_at));
    }

    #[test]
    fn test_record_access_updates_stats() {
        let mut entry = make_entry(b"data");
        let created = entry.created_at;

        entry.record_access();
        entry.record_access();

        assert_eq!(entry.access_count, 2);
        assert_eq!(entry.created_at, created);
        assert!(entry.last_accessed_at >= created);
    }

    #[test]
    fn test_eviction_score_drops_with_frequency() {
        let mut hot = make_entry(b"hot");
        let cold = make_entry(b"cold");

        for _ in 0..100 {
            hot.record_access();
        }

        assert!(hot.eviction_score() <= cold.eviction_score());
    }

    #[test]
    fn test_entry_metadata_round_trip() {
        let mut tags = HashMap::new();
        tags.insert("source".to_string(), serde_json::json!("audit"));
        let entry = make_entry(b"payload").with_metadata(tags);

        let json = serde_json::to_string(&entry).unwrap();
        let parsed: Entry = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.value, entry.value);
        assert_eq!(parsed.metadata["source"], serde_json::json!("audit"));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn ttl_remaining_never_exceeds_ttl(ttl in 0u64..100_000) {
                let entry = Entry::with_ttl(Bytes::from_static(b"x"), ttl);
                if let Some(remaining) = entry.ttl_remaining() {
                    prop_assert!(remaining <= ttl);
                }
            }

            #[test]
            fn expiry_is_monotone_in_time(ttl in 0u64..100_000, offset in 0u64..200_000) {
                let entry = Entry::with_ttl(Bytes::from_static(b"x"), ttl);
                let at = entry.created_at + offset;
                if entry.is_expired_at(at) {
                    prop_assert!(entry.is_expired_at(at + 1));
                }
            }
        }
    }
}
