//! Windowed Rate Limiting
//!
//! Fixed-window request counting with per-rule allow/deny lists and
//! cooldown blocks, persisted through the tiered store so limits hold
//! across processes when a shared or durable tier is attached.

pub mod limiter;
pub mod rule;
pub mod window;

pub use limiter::{CheckOptions, CheckResult, RateLimiter, RuleStats};
pub use rule::{Rule, RuleRegistry};
pub use window::{WindowEntry, WindowState};
