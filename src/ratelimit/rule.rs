//! Named rate-limit rules and their process-lifetime registry.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One named limiting policy.
///
/// Rules are immutable once registered; redefinition replaces the whole
/// rule (last write wins by name).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rule {
    /// Registry key, also embedded in counter storage keys.
    pub name: String,
    /// Window length in milliseconds.
    pub window_ms: u64,
    /// Requests allowed per window.
    pub max_requests: u64,
    /// Cooldown after the limit is hit. Defaults to the window length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_duration_ms: Option<u64>,
    /// When present, identifiers absent from this set are denied outright.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_list: Option<HashSet<String>>,
    /// Identifiers denied unconditionally. Checked before the allow list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deny_list: Option<HashSet<String>>,
}

impl Rule {
    /// A plain counting rule with no lists and default block duration.
    pub fn new(name: impl Into<String>, window_ms: u64, max_requests: u64) -> Self {
        Self {
            name: name.into(),
            window_ms,
            max_requests,
            block_duration_ms: None,
            allow_list: None,
            deny_list: None,
        }
    }

    pub fn with_block_duration(mut self, block_duration_ms: u64) -> Self {
        self.block_duration_ms = Some(block_duration_ms);
        self
    }

    pub fn with_allow_list(mut self, identifiers: impl IntoIterator<Item = String>) -> Self {
        self.allow_list = Some(identifiers.into_iter().collect());
        self
    }

    pub fn with_deny_list(mut self, identifiers: impl IntoIterator<Item = String>) -> Self {
        self.deny_list = Some(identifiers.into_iter().collect());
        self
    }

    /// Effective cooldown once the limit is hit.
    pub fn block_duration(&self) -> u64 {
        self.block_duration_ms.unwrap_or(self.window_ms)
    }

    /// Reject malformed rules at registration time rather than at use time.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Config("rule name must not be empty".to_string()));
        }
        if self.name.contains(':') {
            return Err(Error::Config(format!(
                "rule name '{}' must not contain ':'",
                self.name
            )));
        }
        if self.window_ms == 0 {
            return Err(Error::Config(format!(
                "rule '{}': window_ms must be positive",
                self.name
            )));
        }
        if self.max_requests == 0 {
            return Err(Error::Config(format!(
                "rule '{}': max_requests must be positive",
                self.name
            )));
        }
        if self.block_duration_ms == Some(0) {
            return Err(Error::Config(format!(
                "rule '{}': block_duration_ms must be positive when set",
                self.name
            )));
        }
        Ok(())
    }

    /// Deny-list membership wins over everything else.
    pub fn is_denied(&self, identifier: &str) -> bool {
        self.deny_list
            .as_ref()
            .is_some_and(|set| set.contains(identifier))
    }

    /// An allow list turns the rule into default-deny for anyone unlisted.
    pub fn is_outside_allow_list(&self, identifier: &str) -> bool {
        self.allow_list
            .as_ref()
            .is_some_and(|set| !set.contains(identifier))
    }
}

/// In-memory name→rule mapping. No persistence; rules live for the
/// lifetime of the process and are re-seeded at startup.
#[derive(Default)]
pub struct RuleRegistry {
    rules: RwLock<HashMap<String, Rule>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a rule. Validation failures leave any existing
    /// rule of the same name untouched.
    pub fn define(&self, rule: Rule) -> Result<()> {
        rule.validate()?;
        self.rules.write().insert(rule.name.clone(), rule);
        Ok(())
    }

    /// Look up a rule, cloning it out of the registry.
    pub fn get(&self, name: &str) -> Option<Rule> {
        self.rules.read().get(name).cloned()
    }

    /// Like `get` but mapping absence to the hard error callers propagate.
    pub fn resolve(&self, name: &str) -> Result<Rule> {
        self.get(name).ok_or_else(|| Error::UnknownRule(name.to_string()))
    }

    pub fn remove(&self, name: &str) -> bool {
        self.rules.write().remove(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.rules.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }
}

// ====== Tests ======

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_validate_rejects_bad_rules() {
        assert_matches!(Rule::new("", 1_000, 5).validate(), Err(Error::Config(_)));
        assert_matches!(Rule::new("api", 0, 5).validate(), Err(Error::Config(_)));
        assert_matches!(Rule::new("api", 1_000, 0).validate(), Err(Error::Config(_)));
        assert_matches!(
            Rule::new("api:v2", 1_000, 5).validate(),
            Err(Error::Config(_))
        );
        assert_matches!(
            Rule::new("api", 1_000, 5).with_block_duration(0).validate(),
            Err(Error::Config(_))
        );
        assert!(Rule::new("api", 1_000, 5).validate().is_ok());
    }

    #[test]
    fn test_block_duration_defaults_to_window() {
        let rule = Rule::new("api", 60_000, 100);
        assert_eq!(rule.block_duration(), 60_000);
        let rule = rule.with_block_duration(5_000);
        assert_eq!(rule.block_duration(), 5_000);
    }

    #[test]
    fn test_list_membership() {
        let rule = Rule::new("api", 1_000, 5)
            .with_allow_list(["alice".to_string()])
            .with_deny_list(["mallory".to_string()]);

        assert!(rule.is_denied("mallory"));
        assert!(!rule.is_denied("alice"));
        assert!(!rule.is_outside_allow_list("alice"));
        assert!(rule.is_outside_allow_list("bob"));

        // No allow list means nobody is "outside" it.
        let open = Rule::new("open", 1_000, 5);
        assert!(!open.is_outside_allow_list("anyone"));
    }

    #[test]
    fn test_registry_last_write_wins() {
        let registry = RuleRegistry::new();
        registry.define(Rule::new("api", 1_000, 5)).unwrap();
        registry.define(Rule::new("api", 2_000, 10)).unwrap();

        let rule = registry.get("api").unwrap();
        assert_eq!(rule.window_ms, 2_000);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_resolve_unknown_is_hard_error() {
        let registry = RuleRegistry::new();
        assert_matches!(registry.resolve("ghost"), Err(Error::UnknownRule(name)) if name == "ghost");
    }

    #[test]
    fn test_invalid_redefinition_keeps_existing() {
        let registry = RuleRegistry::new();
        registry.define(Rule::new("api", 1_000, 5)).unwrap();
        assert!(registry.define(Rule::new("api", 0, 5)).is_err());
        assert_eq!(registry.get("api").unwrap().window_ms, 1_000);
    }
}
