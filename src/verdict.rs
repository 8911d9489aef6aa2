//! Oracle verdicts.
//!
//! The oracle answers with loosely formatted string fields ([`RawOracleResponse`]).
//! They are normalized exactly once into a typed [`OracleVerdict`]; malformed
//! fields are rejected at that boundary instead of leaking downstream.

use serde::{Deserialize, Serialize};

use crate::confidence::Confidence;
use crate::error::ValidationError;

/// Raw oracle response, as produced by the oracle's structured output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOracleResponse {
    /// `"yes"` or `"no"`.
    #[serde(default)]
    pub match_found: String,
    /// The pattern the oracle picked, as free text.
    #[serde(default)]
    pub best_match_pattern: String,
    /// Decimal confidence, e.g. `"0.85"`.
    #[serde(default)]
    pub confidence: String,
    /// Comma-separated parameter values.
    #[serde(default)]
    pub parameter_values: String,
}

impl RawOracleResponse {
    /// A positive response.
    #[must_use]
    pub fn matched(
        pattern: impl Into<String>,
        confidence: impl Into<String>,
        parameter_values: impl Into<String>,
    ) -> Self {
        Self {
            match_found: "yes".to_string(),
            best_match_pattern: pattern.into(),
            confidence: confidence.into(),
            parameter_values: parameter_values.into(),
        }
    }

    /// The response an oracle gives when nothing fits.
    #[must_use]
    pub fn no_match() -> Self {
        Self {
            match_found: "no".to_string(),
            best_match_pattern: String::new(),
            confidence: "0.0".to_string(),
            parameter_values: String::new(),
        }
    }
}

/// Normalized oracle opinion on a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleVerdict {
    /// Whether the oracle found a fitting pattern.
    pub match_found: bool,
    /// The pattern the oracle named (not yet reconciled against the catalog).
    pub chosen_pattern_text: String,
    /// Oracle confidence.
    pub confidence: Confidence,
    /// Parameter values in capture-group order.
    pub parameter_values: Vec<String>,
}

impl OracleVerdict {
    /// The canonical "no opinion" verdict.
    #[must_use]
    pub fn no_match() -> Self {
        Self {
            match_found: false,
            chosen_pattern_text: String::new(),
            confidence: Confidence::zero(),
            parameter_values: Vec::new(),
        }
    }

    /// Normalizes a raw oracle response.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::MalformedOracleField` when `match_found` is not a
    /// recognizable boolean or `confidence` is not a number, and
    /// `ConfidenceOutOfRange` when the confidence is outside [0.0, 1.0].
    pub fn from_raw(raw: &RawOracleResponse) -> Result<Self, ValidationError> {
        let match_found = parse_flag(&raw.match_found)?;
        let confidence = if raw.confidence.trim().is_empty() && !match_found {
            Confidence::zero()
        } else {
            Confidence::parse(&raw.confidence)?
        };

        Ok(Self {
            match_found,
            chosen_pattern_text: raw.best_match_pattern.trim().to_string(),
            confidence,
            parameter_values: split_parameters(&raw.parameter_values),
        })
    }

    /// Returns true if this is the canonical no-match value.
    #[must_use]
    pub fn is_no_match(&self) -> bool {
        *self == Self::no_match()
    }
}

impl Default for OracleVerdict {
    fn default() -> Self {
        Self::no_match()
    }
}

impl TryFrom<&RawOracleResponse> for OracleVerdict {
    type Error = ValidationError;

    fn try_from(raw: &RawOracleResponse) -> Result<Self, Self::Error> {
        Self::from_raw(raw)
    }
}

fn parse_flag(text: &str) -> Result<bool, ValidationError> {
    match text.trim().to_ascii_lowercase().as_str() {
        "yes" | "true" | "y" => Ok(true),
        "no" | "false" | "n" | "" => Ok(false),
        other => Err(ValidationError::MalformedOracleField {
            field: "match_found".to_string(),
            reason: format!("expected yes/no, got '{other}'"),
        }),
    }
}

/// Splits a comma-separated parameter list, trimming each value.
///
/// Trailing empty values are dropped; interior empties keep their position.
#[must_use]
pub fn split_parameters(text: &str) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let mut values: Vec<String> = text.split(',').map(|v| v.trim().to_string()).collect();
    while values.last().is_some_and(String::is_empty) {
        values.pop();
    }
    values
}
