//! Test doubles for tier backends
//!
//! A fault-injecting wrapper used by the integration suite to simulate an
//! unreachable shared or durable tier without a network.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use super::backend::{TierBackend, TierName};
use super::entry::Entry;
use crate::error::{Error, Result};

/// Wraps another backend and, when switched to failing, answers every
/// operation with `BackendUnavailable`.
pub struct FlakyTier {
    inner: Arc<dyn TierBackend>,
    failing: AtomicBool,
}

impl FlakyTier {
    /// Wrap `inner`, initially healthy.
    pub fn new(inner: Arc<dyn TierBackend>) -> Self {
        Self {
            inner,
            failing: AtomicBool::new(false),
        }
    }

    /// Toggle failure mode.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(Error::unavailable(
                self.inner.name().label(),
                "injected failure",
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TierBackend for FlakyTier {
    fn name(&self) -> TierName {
        self.inner.name()
    }

    async fn get(&self, key: &str) -> Result<Option<Entry>> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, entry: Entry, ttl_seconds: Option<u64>) -> Result<()> {
        self.check()?;
        self.inner.set(key, entry, ttl_seconds).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.check()?;
        self.inner.exists(key).await
    }

    async fn keys_matching(&self, prefix: &str) -> Result<Vec<String>> {
        self.check()?;
        self.inner.keys_matching(prefix).await
    }

    async fn purge_expired(&self, audit_retention_secs: u64) -> Result<u64> {
        self.check()?;
        self.inner.purge_expired(audit_retention_secs).await
    }
}
