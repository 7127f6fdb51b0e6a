//! StrataKV - Tiered Key-Value Store with Windowed Rate Limiting
//!
//! A process-local cache, a shared network cache, and a durable database
//! composed behind one key-value interface, plus a fixed-window rate
//! limiter built on the same tiers.
//!
//! # Architecture
//!
//! ```text
//! caller ──► TieredStore ──► Memory ──► Shared (Redis) ──► Durable (Postgres)
//!               │                         read-through ◄── backfill
//!               └──► RateLimiter ──► RuleRegistry
//! ```
//!
//! Reads walk the tiers fastest-first and backfill on a hit; writes fan
//! out to every enabled tier, with the durable tier optionally handled
//! by a write-behind queue. A [`Reaper`](reaper::Reaper) sweeps expired
//! entries in the background.
//!
//! # Modules
//!
//! - [`config`] - Store and reaper configuration, environment loading
//! - [`error`] - Error types
//! - [`ratelimit`] - Windowed rate limiting and rule registry
//! - [`reaper`] - Background expiry sweep
//! - [`store`] - Tier backends and the tiered store
//!
//! # Example
//!
//! ```
//! use stratakv::store::TieredStore;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = TieredStore::in_memory();
//! store.set("greeting", &b"hello"[..], Some(60), None).await;
//! assert_eq!(store.get("greeting").await.unwrap().as_ref(), b"hello");
//! # }
//! ```

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod reaper;
pub mod store;

// Re-export commonly used types
pub use config::{ReaperConfig, StoreConfig};
pub use error::{Error, Result};
pub use ratelimit::{CheckResult, RateLimiter, Rule};
pub use reaper::Reaper;
pub use store::{Entry, TierBackend, TierName, TieredStore, WriteOutcome};
