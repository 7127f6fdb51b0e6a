//! Background Reaper
//!
//! Periodic sweep that purges lazily-expired in-process entries and
//! prunes durable rows past their retention. Expiry is otherwise lazy
//! (checked on read), so the reaper only reclaims space for keys nobody
//! reads again.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::store::TieredStore;

/// Handle to the running sweep task.
pub struct Reaper {
    handle: JoinHandle<()>,
    token: CancellationToken,
}

impl Reaper {
    /// Spawn the sweep loop. The interval comes from the store's
    /// configuration; the loop observes a child of the store's shutdown
    /// token, so `TieredStore::shutdown` also stops it while `stop` only
    /// affects this reaper.
    pub fn spawn(store: Arc<TieredStore>) -> Self {
        let token = store.shutdown_token().child_token();
        let interval = Duration::from_secs(store.config().reaper.cleanup_interval_secs.max(1));
        let handle = tokio::spawn(run(store, token.clone(), interval));
        Self { handle, token }
    }

    /// Stop the loop and wait for the in-flight sweep, if any. Idempotent.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "reaper task did not stop cleanly");
        }
    }
}

async fn run(store: Arc<TieredStore>, token: CancellationToken, interval: Duration) {
    info!(interval_secs = interval.as_secs(), "reaper started");
    let mut ticker = tokio::time::interval(interval);
    // The immediate first tick would sweep a store that was just built.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                debug!("reaper stopping");
                return;
            }
            _ = ticker.tick() => {
                // A failed sweep must not kill the loop; purge_expired
                // already degrades per tier, this guards the whole pass.
                let purged = store.purge_expired().await;
                if purged > 0 {
                    info!(purged, "reaper swept expired entries");
                } else {
                    debug!("reaper sweep found nothing to purge");
                }
            }
        }
    }
}

// ====== Tests ======
