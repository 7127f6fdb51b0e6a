//! Fixed-window request counter state.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub(crate) fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Lifecycle of a counter window at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    /// No window open (none recorded, or the previous one lapsed).
    Fresh,
    /// A window is open and still counting.
    Active,
    /// The limit was exceeded and the block has not yet expired.
    Blocked,
}

/// Persisted counter state for one (rule, identifier) pair.
///
/// Stored through the tiered store as a JSON value; the field names are
/// part of the durable row format and must stay stable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WindowEntry {
    /// Requests observed in the current window.
    pub request_count: u64,
    /// Window open instant, epoch milliseconds.
    pub window_start_ms: u64,
    /// Window close instant, epoch milliseconds.
    pub window_end_ms: u64,
    /// Whether the identifier is currently blocked.
    pub blocked: bool,
    /// When the block lifts, epoch milliseconds. Zero when not blocked.
    #[serde(default)]
    pub block_expiry_ms: u64,
    /// Most recent request instant, epoch milliseconds.
    pub last_request_ms: u64,
}

impl WindowEntry {
    /// Open a new window at `now` counting its first request.
    pub fn open(now_ms: u64, window_ms: u64) -> Self {
        Self {
            request_count: 1,
            window_start_ms: now_ms,
            window_end_ms: now_ms + window_ms,
            blocked: false,
            block_expiry_ms: 0,
            last_request_ms: now_ms,
        }
    }

    /// Classify this entry at the given instant.
    pub fn state_at(&self, now_ms: u64) -> WindowState {
        if self.blocked && now_ms < self.block_expiry_ms {
            return WindowState::Blocked;
        }
        if now_ms < self.window_end_ms && !self.blocked {
            return WindowState::Active;
        }
        WindowState::Fresh
    }

    /// Count one more request in the open window.
    pub fn record(&mut self, now_ms: u64) {
        self.request_count += 1;
        self.last_request_ms = now_ms;
    }

    /// Mark the identifier blocked until `now + block_ms`.
    pub fn block(&mut self, now_ms: u64, block_ms: u64) {
        self.blocked = true;
        self.block_expiry_ms = now_ms + block_ms;
        self.last_request_ms = now_ms;
    }

    /// Requests still allowed in this window under the given cap.
    pub fn remaining(&self, max_requests: u64) -> u64 {
        max_requests.saturating_sub(self.request_count)
    }

    /// When the caller may retry, epoch milliseconds: block expiry while
    /// blocked, window end otherwise.
    pub fn retry_at_ms(&self) -> u64 {
        if self.blocked {
            self.block_expiry_ms
        } else {
            self.window_end_ms
        }
    }
}

// ====== Tests ======

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_counts_first_request() {
        let entry = WindowEntry::open(1_000, 60_000);
        assert_eq!(entry.request_count, 1);
        assert_eq!(entry.window_end_ms, 61_000);
        assert!(!entry.blocked);
        assert_eq!(entry.state_at(1_000), WindowState::Active);
    }

    #[test]
    fn test_window_lapses_to_fresh() {
        let entry = WindowEntry::open(1_000, 60_000);
        assert_eq!(entry.state_at(60_999), WindowState::Active);
        assert_eq!(entry.state_at(61_000), WindowState::Fresh);
    }

    #[test]
    fn test_blocked_until_expiry() {
        let mut entry = WindowEntry::open(1_000, 60_000);
        entry.block(2_000, 10_000);
        assert_eq!(entry.state_at(5_000), WindowState::Blocked);
        assert_eq!(entry.state_at(11_999), WindowState::Blocked);
        // Block lapse goes straight to Fresh, never back to Active.
        assert_eq!(entry.state_at(12_000), WindowState::Fresh);
        assert_eq!(entry.retry_at_ms(), 12_000);
    }

    #[test]
    fn test_remaining_saturates() {
        let mut entry = WindowEntry::open(0, 1_000);
        assert_eq!(entry.remaining(3), 2);
        entry.record(10);
        entry.record(20);
        assert_eq!(entry.remaining(3), 0);
        entry.record(30);
        assert_eq!(entry.remaining(3), 0);
    }

    #[test]
    fn test_serde_field_names_stable() {
        let entry = WindowEntry::open(5, 10);
        let json = serde_json::to_value(&entry).unwrap();
        for field in [
            "request_count",
            "window_start_ms",
            "window_end_ms",
            "blocked",
            "block_expiry_ms",
            "last_request_ms",
        ] {
            assert!(json.get(field).is_some(), "missing field {field}");
        }
    }
}
