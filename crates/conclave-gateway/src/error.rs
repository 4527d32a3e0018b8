//! Error types for the Gateway

use conclave_core::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Error taxonomy used by the dispatcher to decide between failing and degrading
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    /// Bad caller input: no retry, no fallback
    Validation,
    /// Pool exhausted or connection broken
    Unavailable,
    /// Breaker tripped for the expert
    CircuitOpen,
    /// Expert did not answer within the per-call timeout
    ExpertTimeout,
    /// Anything else; recoverable but flagged for investigation
    Uncategorized,
}

impl ErrorCategory {
    pub fn is_recoverable(self) -> bool {
        !matches!(self, ErrorCategory::Validation)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::Unavailable => "unavailable",
            ErrorCategory::CircuitOpen => "circuit-open",
            ErrorCategory::ExpertTimeout => "expert-timeout",
            ErrorCategory::Uncategorized => "uncategorized",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gateway error type
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Handoff not found: {0}")]
    HandoffNotFound(String),

    #[error("Invalid handoff transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: String,
        to: String,
    },

    #[error("Unknown expert: {0}")]
    UnknownExpert(String),

    #[error("Expert unavailable: {expert} ({reason})")]
    Unavailable { expert: String, reason: String },

    #[error("All {capacity} sessions for {expert} are busy")]
    PoolExhausted { expert: String, capacity: usize },

    #[error("Circuit breaker OPEN for {expert} - retry after {retry_after:?}")]
    CircuitOpen {
        expert: String,
        retry_after: Duration,
    },

    #[error("Expert {expert} timed out after {timeout:?}")]
    ExpertTimeout { expert: String, timeout: Duration },

    #[error("Call to {expert} was cancelled")]
    Cancelled { expert: String },

    #[error("Expert call failed: {0}")]
    Expert(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            GatewayError::Validation(_)
            | GatewayError::MissingField(_)
            | GatewayError::Core(_)
            | GatewayError::HandoffNotFound(_)
            | GatewayError::InvalidTransition { .. }
            | GatewayError::InvalidConfig(_) => ErrorCategory::Validation,
            GatewayError::UnknownExpert(_)
            | GatewayError::Unavailable { .. }
            | GatewayError::PoolExhausted { .. } => ErrorCategory::Unavailable,
            GatewayError::CircuitOpen { .. } => ErrorCategory::CircuitOpen,
            GatewayError::ExpertTimeout { .. } => ErrorCategory::ExpertTimeout,
            GatewayError::Cancelled { .. }
            | GatewayError::Expert(_)
            | GatewayError::Io(_)
            | GatewayError::Serialization(_)
            | GatewayError::Internal(_) => ErrorCategory::Uncategorized,
        }
    }

    /// Whether this failure says something about the expert's health.
    /// Local pool saturation and cancellation do not.
    pub fn counts_against_expert(&self) -> bool {
        self.category().is_recoverable()
            && !matches!(
                self,
                GatewayError::PoolExhausted { .. } | GatewayError::Cancelled { .. }
            )
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for GatewayError {
    fn from(e: toml::de::Error) -> Self {
        GatewayError::InvalidConfig(e.to_string())
    }
}

/// Result type for Gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            GatewayError::MissingField("taskId").category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            GatewayError::Core(CoreError::MissingField("expert")).category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            GatewayError::CircuitOpen {
                expert: "a".into(),
                retry_after: Duration::from_secs(1)
            }
            .category(),
            ErrorCategory::CircuitOpen
        );
        assert_eq!(
            GatewayError::Expert("boom".into()).category(),
            ErrorCategory::Uncategorized
        );
    }

    #[test]
    fn test_expert_health_attribution() {
        assert!(GatewayError::Expert("boom".into()).counts_against_expert());
        assert!(!GatewayError::PoolExhausted {
            expert: "a".into(),
            capacity: 2
        }
        .counts_against_expert());
        assert!(!GatewayError::Validation("bad".into()).counts_against_expert());
    }

    #[test]
    fn test_category_wire_names() {
        assert_eq!(
            serde_json::to_value(ErrorCategory::ExpertTimeout).unwrap(),
            "expert-timeout"
        );
        assert_eq!(ErrorCategory::CircuitOpen.to_string(), "circuit-open");
    }
}
