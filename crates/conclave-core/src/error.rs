//! Error types for Conclave Core
//!
//! Every error raised by this crate is a caller mistake (bad input). The
//! gateway classifies all of them as validation failures.

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Main error type for core operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Confidence for {expert} must be in range [0.0, 1.0], got {value}")]
    InvalidConfidence { expert: String, value: f64 },

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },
}

/// Check that a confidence value lies in [0.0, 1.0].
pub(crate) fn check_confidence(expert: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(CoreError::InvalidConfidence {
            expert: expert.to_string(),
            value,
        })
    }
}
