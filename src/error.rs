//! Error types for semstep.
//!
//! All errors are strongly typed using thiserror. The matching path itself never
//! surfaces these to the host runner: oracle, cache and synthesis failures are
//! absorbed and degrade to "no match". They appear on construction and
//! configuration APIs, and inside the pluggable backends.

use thiserror::Error;

/// Validation errors that occur during input validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Confidence value {value} is out of range [0.0, 1.0]")]
    ConfidenceOutOfRange {
        value: f32,
    },

    #[error("Confidence threshold {value} is out of range [0.0, 1.0]")]
    ThresholdOutOfRange {
        value: f32,
    },

    #[error("Step pattern source cannot be empty")]
    EmptyPattern,

    #[error("Invalid step pattern '{source_text}': {reason}")]
    InvalidPattern {
        source_text: String,
        reason: String,
    },

    #[error("Malformed oracle field '{field}': {reason}")]
    MalformedOracleField {
        field: String,
        reason: String,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Errors reported by an oracle implementation.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Oracle transport failed: {message}")]
    Transport {
        message: String,
    },

    #[error("Oracle timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Oracle provider error (code {code}): {message}")]
    Provider {
        code: u32,
        message: String,
    },

    #[error("Malformed oracle response: {message}")]
    MalformedResponse {
        message: String,
    },
}

impl OracleError {
    /// Returns true if sending the same request again could succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Timeout { .. } => true,
            Self::Provider { code, .. } => *code >= 500,
            Self::MalformedResponse { .. } => false,
        }
    }
}

/// Errors from a verdict cache backend.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache entry is corrupt: {message}")]
    Corrupt {
        message: String,
    },

    #[error("Cache backend error: {message}")]
    Backend {
        message: String,
    },
}

/// Errors while rebuilding a step text from a pattern body.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SynthesisError {
    #[error("Unbalanced group opened at position {position}")]
    UnbalancedGroup {
        position: usize,
    },

    #[error("Unterminated character class opened at position {position}")]
    UnterminatedClass {
        position: usize,
    },

    #[error("Pattern body ends with a dangling escape")]
    TrailingEscape,
}

/// Top-level error type for semstep.
#[derive(Debug, Error)]
pub enum SemstepError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl SemstepError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an oracle error.
    #[must_use]
    pub const fn is_oracle(&self) -> bool {
        matches!(self, Self::Oracle(_))
    }

    /// Returns true if this is a cache error.
    #[must_use]
    pub const fn is_cache(&self) -> bool {
        matches!(self, Self::Cache(_))
    }

    /// Returns true if retrying the same oracle request could succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Oracle(e) => e.is_retryable(),
            Self::Validation(_) | Self::Cache(_) | Self::Synthesis(_) | Self::Internal { .. } => {
                false
            }
        }
    }
}

/// Errors a step runner reports for a single step.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("Undefined step: '{text}'")]
    Undefined {
        text: String,
    },

    #[error("Ambiguous step '{text}' matches {} patterns: {}", .candidates.len(), .candidates.join(", "))]
    Ambiguous {
        text: String,
        candidates: Vec<String>,
    },

    #[error("Step '{text}' failed in {pattern}: {message}")]
    HandlerFailed {
        text: String,
        pattern: String,
        message: String,
    },

    #[error(transparent)]
    Semstep(#[from] SemstepError),
}

/// Result type alias for semstep operations.
pub type SemstepResult<T> = Result<T, SemstepError>;
