//! Durable write-behind queue
//!
//! The durable tier is the slowest in the chain, so write-through to it is
//! decoupled from the hot path: writes are queued and applied by a worker
//! task. Shutdown closes the queue and drains whatever is pending, so a
//! clean shutdown loses nothing that was accepted.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::backend::TierBackend;
use super::entry::Entry;
use super::metrics::StoreMetrics;

/// A queued durable-tier operation.
#[derive(Debug)]
pub(crate) enum WriteJob {
    Set {
        key: String,
        entry: Entry,
        ttl_seconds: Option<u64>,
    },
    Delete {
        key: String,
    },
}

/// Background writer for the durable tier.
pub(crate) struct WriteBehind {
    tx: Mutex<Option<mpsc::Sender<WriteJob>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl WriteBehind {
    /// Start the worker with a bounded queue.
    pub fn spawn(
        backend: Arc<dyn TierBackend>,
        depth: usize,
        metrics: Arc<StoreMetrics>,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<WriteJob>(depth);
        let tier = backend.name();

        let handle = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let result = match &job {
                    WriteJob::Set {
                        key,
                        entry,
                        ttl_seconds,
                    } => backend.set(key, entry.clone(), *ttl_seconds).await,
                    WriteJob::Delete { key } => backend.delete(key).await.map(|_| ()),
                };

                if let Err(e) = result {
                    metrics.tier(tier).record_error();
                    warn!(tier = %tier, error = %e, "write-behind operation failed");
                }
            }
            debug!(tier = %tier, "write-behind worker drained");
        });

        Self {
            tx: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Queue a job without blocking. Returns false when the queue is full
    /// or already shut down.
    pub fn try_enqueue(&self, job: WriteJob) -> bool {
        match self.tx.lock().as_ref() {
            Some(tx) => tx.try_send(job).is_ok(),
            None => false,
        }
    }

    /// Close the queue and wait for the worker to drain it. Safe to call
    /// more than once.
    pub async fn flush_and_stop(&self) {
        // Dropping the sender closes the channel; the worker finishes the
        // backlog and exits.
        drop(self.tx.lock().take());

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "write-behind worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryTier;
    use bytes::Bytes;

    fn job(key: &str, data: &[u8]) -> WriteJob {
        WriteJob::Set {
            key: key.to_string(),
            entry: Entry::new(Bytes::copy_from_slice(data)),
            ttl_seconds: None,
        }
    }

    #[tokio::test]
    async fn test_write_behind_applies_queued_sets() {
        let backend = Arc::new(MemoryTier::new());
        let metrics = Arc::new(StoreMetrics::new());
        let writer = WriteBehind::spawn(backend.clone(), 16, metrics);

        assert!(writer.try_enqueue(job("a", b"1")));
        assert!(writer.try_enqueue(job("b", b"2")));

        writer.flush_and_stop().await;

        assert!(backend.exists("a").await.unwrap());
        assert!(backend.exists("b").await.unwrap());
    }

    #[tokio::test]
    async fn test_write_behind_delete_after_set() {
        let backend = Arc::new(MemoryTier::new());
        let metrics = Arc::new(StoreMetrics::new());
        let writer = WriteBehind::spawn(backend.clone(), 16, metrics);

        writer.try_enqueue(job("k", b"v"));
        writer.try_enqueue(WriteJob::Delete {
            key: "k".to_string(),
        });
        writer.flush_and_stop().await;

        assert!(!backend.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_is_rejected() {
        let backend = Arc::new(MemoryTier::new());
        let metrics = Arc::new(StoreMetrics::new());
        let writer = WriteBehind::spawn(backend, 16, metrics);

        writer.flush_and_stop().await;
        assert!(!writer.try_enqueue(job("late", b"x")));

        // Second stop is a no-op.
        writer.flush_and_stop().await;
    }
}
