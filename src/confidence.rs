//! Confidence values and the confidence gate.
//!
//! The oracle reports its confidence as a decimal string. It is parsed once,
//! at the oracle boundary, into a validated [`Confidence`]; every later
//! comparison is numeric.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::verdict::OracleVerdict;

/// Oracle confidence in a verdict, in `[0.0, 1.0]`.
///
/// # Examples
///
/// ```
/// use semstep::Confidence;
///
/// let conf = Confidence::parse(" 0.92 ").unwrap();
/// assert_eq!(conf.value(), 0.92);
/// assert!(Confidence::parse("1.5").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub struct Confidence(f32);

impl Confidence {
    /// Minimum valid confidence value.
    pub const MIN_VALUE: f32 = 0.0;

    /// Maximum valid confidence value.
    pub const MAX_VALUE: f32 = 1.0;

    /// Creates a new confidence with validation.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::ConfidenceOutOfRange` if the value is not finite
    /// or not in [0.0, 1.0].
    pub fn new(value: f32) -> Result<Self, ValidationError> {
        if !value.is_finite() || !(Self::MIN_VALUE..=Self::MAX_VALUE).contains(&value) {
            return Err(ValidationError::ConfidenceOutOfRange { value });
        }
        Ok(Self(value))
    }

    /// Parses a decimal string such as `"0.85"`, ignoring surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::MalformedOracleField` if the text is not a number,
    /// or `ConfidenceOutOfRange` if it is outside [0.0, 1.0].
    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        let trimmed = text.trim();
        let value: f32 = trimmed
            .parse()
            .map_err(|e| ValidationError::MalformedOracleField {
                field: "confidence".to_string(),
                reason: format!("'{trimmed}' is not a decimal number: {e}"),
            })?;
        Self::new(value)
    }

    /// Zero confidence, used by the canonical no-match verdict.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0.0)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn value(self) -> f32 {
        self.0
    }
}

impl Default for Confidence {
    fn default() -> Self {
        Self::zero()
    }
}

impl TryFrom<f32> for Confidence {
    type Error = ValidationError;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Confidence> for f32 {
    fn from(conf: Confidence) -> Self {
        conf.0
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

/// Accepts or rejects oracle verdicts against a threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceGate {
    threshold: f32,
}

impl ConfidenceGate {
    /// Creates a gate for the given threshold.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::ThresholdOutOfRange` if the threshold is not finite
    /// or not in [0.0, 1.0].
    pub fn new(threshold: f32) -> Result<Self, ValidationError> {
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(ValidationError::ThresholdOutOfRange { value: threshold });
        }
        Ok(Self { threshold })
    }

    /// Returns the configured threshold.
    #[must_use]
    pub const fn threshold(&self) -> f32 {
        self.threshold
    }

    /// True iff the oracle found a match with confidence at or above the threshold.
    #[must_use]
    pub fn accepts(&self, verdict: &OracleVerdict) -> bool {
        verdict.match_found && verdict.confidence.value() >= self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(match_found: bool, confidence: f32) -> OracleVerdict {
        OracleVerdict {
            match_found,
            chosen_pattern_text: "/^x$/".to_string(),
            confidence: Confidence::new(confidence).unwrap(),
            parameter_values: Vec::new(),
        }
    }

    #[test]
    fn test_confidence_bounds() {
        assert!(Confidence::new(0.0).is_ok());
        assert!(Confidence::new(1.0).is_ok());
        assert!(Confidence::new(-0.01).is_err());
        assert!(Confidence::new(1.01).is_err());
        assert!(Confidence::new(f32::NAN).is_err());
        assert!(Confidence::new(f32::INFINITY).is_err());
    }

    #[test]
    fn test_confidence_parse() {
        assert_eq!(Confidence::parse("0.85").unwrap().value(), 0.85);
        assert_eq!(Confidence::parse("  1 ").unwrap().value(), 1.0);
        assert!(matches!(
            Confidence::parse("high"),
            Err(ValidationError::MalformedOracleField { .. })
        ));
        assert!(matches!(
            Confidence::parse("85"),
            Err(ValidationError::ConfidenceOutOfRange { .. })
        ));
        assert!(Confidence::parse("").is_err());
    }

    #[test]
    fn test_confidence_serde_rejects_out_of_range() {
        let ok: Confidence = serde_json::from_str("0.5").unwrap();
        assert_eq!(ok.value(), 0.5);
        assert!(serde_json::from_str::<Confidence>("2.0").is_err());
    }

    #[test]
    fn test_gate_threshold_validation() {
        assert!(ConfidenceGate::new(0.7).is_ok());
        assert!(ConfidenceGate::new(-0.1).is_err());
        assert!(ConfidenceGate::new(1.1).is_err());
        assert!(ConfidenceGate::new(f32::NAN).is_err());
    }

    #[test]
    fn test_gate_boundary_is_inclusive() {
        for &tau in &[0.0f32, 0.25, 0.7, 0.9, 1.0] {
            let gate = ConfidenceGate::new(tau).unwrap();
            assert!(gate.accepts(&verdict(true, tau)), "tau={tau}");
        }
    }

    #[test]
    fn test_gate_rejects_just_below_threshold() {
        for &tau in &[0.25f32, 0.7, 0.9, 1.0] {
            let gate = ConfidenceGate::new(tau).unwrap();
            let below = tau - 1e-4;
            assert!(!gate.accepts(&verdict(true, below)), "tau={tau}");
        }
    }

    #[test]
    fn test_gate_rejects_no_match_even_with_high_confidence() {
        let gate = ConfidenceGate::new(0.5).unwrap();
        assert!(!gate.accepts(&verdict(false, 1.0)));
        assert!(!gate.accepts(&OracleVerdict::no_match()));
    }
}
