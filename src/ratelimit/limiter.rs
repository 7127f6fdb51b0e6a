//! Window Counter Engine
//!
//! Per-(rule, identifier) fixed-window request counting on top of the
//! tiered store. Counter state lives under the `rl:` key prefix so it
//! shares tier orchestration, TTL, and reaping with ordinary cache
//! entries while the durable tier can still tell the two apart.
//!
//! Enforcement is best-effort: a storage failure during a check must
//! never deny legitimate traffic, so errors on the read path degrade to
//! a fresh window (fail-open).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use super::rule::{Rule, RuleRegistry};
use super::window::{now_epoch_ms, WindowEntry, WindowState};
use crate::error::Result;
use crate::store::TieredStore;

/// Key prefix for counter state inside the store.
pub(crate) const COUNTER_PREFIX: &str = "rl:";

/// Outcome of one limit check.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Requests left in the current window after this check.
    pub remaining: u64,
    /// When the caller may retry, epoch milliseconds: the window end, or
    /// the block expiry while blocked.
    pub reset_at_ms: u64,
    /// Whether the identifier is in a cooldown block.
    pub blocked: bool,
    /// When the block lifts, if blocked.
    pub block_expiry_ms: Option<u64>,
}

impl CheckResult {
    fn denied_by_list(now_ms: u64, blocked: bool) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            reset_at_ms: now_ms,
            blocked,
            block_expiry_ms: None,
        }
    }
}

/// Options for a single check.
#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    /// When false, the check reports status without counting the request.
    pub increment: bool,
    /// Extra context persisted alongside the counter entry.
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl CheckOptions {
    pub fn counting() -> Self {
        Self {
            increment: true,
            metadata: None,
        }
    }

    pub fn peek() -> Self {
        Self::default()
    }
}

/// Per-rule decision counters.
#[derive(Default)]
struct RuleCounters {
    checks: AtomicU64,
    allowed: AtomicU64,
    denied: AtomicU64,
}

/// Snapshot of one rule's decision counters.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct RuleStats {
    pub checks: u64,
    pub allowed: u64,
    pub denied: u64,
}

/// The limiter: rule registry plus windowed counters in the store.
pub struct RateLimiter {
    store: Arc<TieredStore>,
    rules: RuleRegistry,
    counters: DashMap<String, RuleCounters>,
}

impl RateLimiter {
    /// Build a limiter over the given store, seeding a `default` rule
    /// from the store's configuration.
    pub fn new(store: Arc<TieredStore>) -> Self {
        let rules = RuleRegistry::new();
        let seeded = Rule::new(
            "default",
            store.config().default_window_ms,
            store.config().default_max_requests,
        );
        // The seeded values come from validated config; a failure here
        // means the config defaults themselves are broken.
        if let Err(e) = rules.define(seeded) {
            warn!(error = %e, "default rule rejected, registry starts empty");
        }

        Self {
            store,
            rules,
            counters: DashMap::new(),
        }
    }

    /// Register or replace a rule.
    pub fn define_rule(&self, rule: Rule) -> Result<()> {
        debug!(rule = %rule.name, window_ms = rule.window_ms, max_requests = rule.max_requests, "defining rule");
        self.rules.define(rule)
    }

    /// The underlying registry, for inspection.
    pub fn rules(&self) -> &RuleRegistry {
        &self.rules
    }

    fn counter_key(rule: &str, identifier: &str) -> String {
        format!("{COUNTER_PREFIX}{rule}:{identifier}")
    }

    /// TTL for persisted counter state: the window plus the worst-case
    /// block, rounded up, so stale entries age out on their own.
    fn counter_ttl_secs(rule: &Rule) -> i64 {
        let span_ms = rule.window_ms + rule.block_duration();
        (span_ms / 1_000 + 2) as i64
    }

    fn record_decision(&self, rule: &str, allowed: bool) {
        let counters = self.counters.entry(rule.to_string()).or_default();
        counters.checks.fetch_add(1, Ordering::Relaxed);
        if allowed {
            counters.allowed.fetch_add(1, Ordering::Relaxed);
        } else {
            counters.denied.fetch_add(1, Ordering::Relaxed);
        }
    }

    async fn load_window(&self, key: &str) -> Option<WindowEntry> {
        match self.store.get_json::<WindowEntry>(key).await {
            Ok(found) => found,
            Err(e) => {
                // Fail open: undecodable state counts as no state.
                warn!(key, error = %e, "counter state unreadable, starting fresh window");
                None
            }
        }
    }

    async fn persist_window(
        &self,
        key: &str,
        entry: &WindowEntry,
        rule: &Rule,
        metadata: Option<HashMap<String, serde_json::Value>>,
    ) {
        let bytes = match serde_json::to_vec(entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key, error = %e, "counter state not persisted");
                return;
            }
        };
        self.store
            .set(key, bytes, Some(Self::counter_ttl_secs(rule)), metadata)
            .await;
    }

    /// Count a request against `rule_name` for `identifier` and decide
    /// whether it may proceed.
    pub async fn check(&self, rule_name: &str, identifier: &str) -> Result<CheckResult> {
        self.check_with(rule_name, identifier, CheckOptions::counting())
            .await
    }

    /// Full-control variant of [`check`](Self::check).
    ///
    /// Resolution of an unregistered rule is a hard [`UnknownRule`]
    /// error; everything downstream of resolution fails open.
    pub async fn check_with(
        &self,
        rule_name: &str,
        identifier: &str,
        options: CheckOptions,
    ) -> Result<CheckResult> {
        let rule = self.rules.resolve(rule_name)?;
        let now_ms = now_epoch_ms();

        // List checks never touch storage. Deny wins over allow.
        if rule.is_denied(identifier) {
            self.record_decision(rule_name, false);
            return Ok(CheckResult::denied_by_list(now_ms, true));
        }
        if rule.is_outside_allow_list(identifier) {
            self.record_decision(rule_name, false);
            return Ok(CheckResult::denied_by_list(now_ms, false));
        }

        let key = Self::counter_key(rule_name, identifier);
        let existing = self.load_window(&key).await;

        let result = match existing {
            Some(entry) if entry.state_at(now_ms) == WindowState::Blocked => CheckResult {
                allowed: false,
                remaining: 0,
                reset_at_ms: entry.block_expiry_ms,
                blocked: true,
                block_expiry_ms: Some(entry.block_expiry_ms),
            },
            Some(mut entry) if entry.state_at(now_ms) == WindowState::Active => {
                let allowed = entry.request_count < rule.max_requests;
                if options.increment && allowed {
                    entry.record(now_ms);
                    if entry.request_count >= rule.max_requests {
                        entry.block(now_ms, rule.block_duration());
                    }
                    self.persist_window(&key, &entry, &rule, options.metadata).await;
                }
                CheckResult {
                    allowed,
                    remaining: entry.remaining(rule.max_requests),
                    reset_at_ms: entry.retry_at_ms(),
                    blocked: entry.blocked,
                    block_expiry_ms: entry.blocked.then_some(entry.block_expiry_ms),
                }
            }
            // Fresh: no entry, a lapsed window, or an expired block.
            _ => {
                if options.increment {
                    let mut entry = WindowEntry::open(now_ms, rule.window_ms);
                    if entry.request_count >= rule.max_requests {
                        entry.block(now_ms, rule.block_duration());
                    }
                    self.persist_window(&key, &entry, &rule, options.metadata).await;
                    CheckResult {
                        allowed: true,
                        remaining: entry.remaining(rule.max_requests),
                        reset_at_ms: entry.retry_at_ms(),
                        blocked: entry.blocked,
                        block_expiry_ms: entry.blocked.then_some(entry.block_expiry_ms),
                    }
                } else {
                    CheckResult {
                        allowed: true,
                        remaining: rule.max_requests,
                        reset_at_ms: now_ms + rule.window_ms,
                        blocked: false,
                        block_expiry_ms: None,
                    }
                }
            }
        };

        self.record_decision(rule_name, result.allowed);
        Ok(result)
    }

    /// Report the current state without counting a request.
    pub async fn status(&self, rule_name: &str, identifier: &str) -> Result<CheckResult> {
        self.check_with(rule_name, identifier, CheckOptions::peek())
            .await
    }

    /// Forget all counter state for one (rule, identifier) pair; the next
    /// check starts a fresh window.
    pub async fn reset(&self, rule_name: &str, identifier: &str) -> Result<()> {
        self.rules.resolve(rule_name)?;
        let key = Self::counter_key(rule_name, identifier);
        self.store.delete(&key).await;
        Ok(())
    }

    /// Decision counters for one rule.
    pub fn stats(&self, rule_name: &str) -> RuleStats {
        self.counters
            .get(rule_name)
            .map(|c| RuleStats {
                checks: c.checks.load(Ordering::Relaxed),
                allowed: c.allowed.load(Ordering::Relaxed),
                denied: c.denied.load(Ordering::Relaxed),
            })
            .unwrap_or_default()
    }

    /// Decision counters for every rule that has seen a check.
    pub fn all_stats(&self) -> HashMap<String, RuleStats> {
        self.counters
            .iter()
            .map(|entry| {
                let c = entry.value();
                (
                    entry.key().clone(),
                    RuleStats {
                        checks: c.checks.load(Ordering::Relaxed),
                        allowed: c.allowed.load(Ordering::Relaxed),
                        denied: c.denied.load(Ordering::Relaxed),
                    },
                )
            })
            .collect()
    }

    /// Drop every counter from every tier and zero the decision stats.
    /// Rules stay registered.
    pub async fn clear_all(&self) {
        self.store.clear(Some(COUNTER_PREFIX)).await;
        self.counters.clear();
    }
}

// ====== Tests ======
