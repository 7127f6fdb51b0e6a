//! Error types for the tiered store and rate limiter

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in StrataKV
#[derive(Error, Debug)]
pub enum Error {
    /// A tier backend could not be reached. Never returned for a plain
    /// cache miss, which is `Ok(None)`.
    #[error("backend unavailable ({tier}): {reason}")]
    BackendUnavailable { tier: String, reason: String },

    /// A rate-limit check referenced a rule that was never registered
    #[error("unknown rate limit rule: {0}")]
    UnknownRule(String),

    /// A value could not be encoded or decoded at the store boundary
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed rule definition or configuration value
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a `BackendUnavailable` for the named tier.
    pub fn unavailable(tier: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::BackendUnavailable {
            tier: tier.into(),
            reason: reason.into(),
        }
    }

    /// True when the error indicates an unreachable tier rather than a
    /// programmer error.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Error::BackendUnavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_constructor() {
        let err = Error::unavailable("shared", "connection refused");
        assert!(err.is_unavailable());
        let msg = err.to_string();
        assert!(msg.contains("shared"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn test_unknown_rule_display() {
        let err = Error::UnknownRule("api-burst".to_string());
        assert_eq!(err.to_string(), "unknown rate limit rule: api-burst");
        assert!(!err.is_unavailable());
    }
}
