//! Matcher configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::oracle::OracleProvider;

/// Default oracle model.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Default minimum confidence for accepting an oracle verdict.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.7;

/// Name of the default cache directory, created under the working directory.
pub const DEFAULT_CACHE_DIR_NAME: &str = ".semstep_cache";

/// Configuration for a [`MatchEngine`](crate::engine::MatchEngine).
///
/// Missing fields take their defaults when deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Provider the oracle routes to.
    pub oracle_provider: OracleProvider,
    /// Model the oracle asks.
    pub model_name: String,
    /// Minimum confidence in [0, 1] for a verdict to be accepted.
    pub confidence_threshold: f32,
    /// Whether verdicts are cached on disk.
    pub cache_enabled: bool,
    /// Directory holding cache entries.
    pub cache_directory: PathBuf,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            oracle_provider: OracleProvider::default(),
            model_name: DEFAULT_MODEL.to_string(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            cache_enabled: true,
            cache_directory: default_cache_directory(),
        }
    }
}

/// `<cwd>/.semstep_cache`, or a relative path if the working directory is unreadable.
#[must_use]
pub fn default_cache_directory() -> PathBuf {
    std::env::current_dir()
        .map(|cwd| cwd.join(DEFAULT_CACHE_DIR_NAME))
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CACHE_DIR_NAME))
}

impl MatcherConfig {
    /// Parses a JSON document and validates it.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` for malformed JSON, and any
    /// error [`MatcherConfig::validate`] reports.
    pub fn from_json_str(json: &str) -> Result<Self, ValidationError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ValidationError::InvalidConfig {
            reason: e.to_string(),
        })?;
        config.validate()
    }

    /// Checks the configuration, returning it unchanged if valid.
    ///
    /// # Errors
    ///
    /// Returns `ThresholdOutOfRange` for a threshold that is not a finite value
    /// in [0, 1], and `InvalidConfig` for an empty model name or cache directory.
    pub fn validate(self) -> Result<Self, ValidationError> {
        let threshold = self.confidence_threshold;
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(ValidationError::ThresholdOutOfRange { value: threshold });
        }

        if self.model_name.trim().is_empty() {
            return Err(ValidationError::InvalidConfig {
                reason: "model_name must not be empty".to_string(),
            });
        }

        if self.cache_enabled && self.cache_directory.as_os_str().is_empty() {
            return Err(ValidationError::InvalidConfig {
                reason: "cache_directory must be set when caching is enabled".to_string(),
            });
        }

        Ok(self)
    }

    /// Sets the oracle provider.
    #[must_use]
    pub fn with_provider(mut self, provider: OracleProvider) -> Self {
        self.oracle_provider = provider;
        self
    }

    /// Sets the model name.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_name = model.into();
        self
    }

    /// Sets the confidence threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Turns the on-disk cache on or off.
    #[must_use]
    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// Sets the cache directory.
    #[must_use]
    pub fn with_cache_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_directory = dir.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MatcherConfig::default();
        assert_eq!(config.oracle_provider, OracleProvider::OpenAi);
        assert_eq!(config.model_name, "gpt-4o");
        assert!((config.confidence_threshold - 0.7).abs() < f32::EPSILON);
        assert!(config.cache_enabled);
        assert!(config.cache_directory.ends_with(".semstep_cache"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config =
            MatcherConfig::from_json_str(r#"{"oracle_provider": "claude", "confidence_threshold": 0.85}"#)
                .unwrap();
        assert_eq!(config.oracle_provider, OracleProvider::Claude);
        assert!((config.confidence_threshold - 0.85).abs() < f32::EPSILON);
        assert_eq!(config.model_name, DEFAULT_MODEL);
        assert!(config.cache_enabled);
    }

    #[test]
    fn test_malformed_json() {
        let err = MatcherConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidConfig { .. }));
    }

    #[test]
    fn test_threshold_bounds() {
        for bad in [-0.1, 1.01, f32::NAN, f32::INFINITY] {
            let err = MatcherConfig::default().with_threshold(bad).validate().unwrap_err();
            assert!(matches!(err, ValidationError::ThresholdOutOfRange { .. }));
        }
        for ok in [0.0, 1.0] {
            assert!(MatcherConfig::default().with_threshold(ok).validate().is_ok());
        }
    }

    #[test]
    fn test_empty_model_rejected() {
        let err = MatcherConfig::default().with_model("  ").validate().unwrap_err();
        assert!(matches!(err, ValidationError::InvalidConfig { .. }));
    }

    #[test]
    fn test_empty_cache_directory_only_matters_when_enabled() {
        let config = MatcherConfig::default().with_cache_directory("");
        assert!(config.clone().validate().is_err());
        assert!(config.with_cache_enabled(false).validate().is_ok());
    }

    #[test]
    fn test_json_round_trip_shape() {
        let config = MatcherConfig::default()
            .with_provider(OracleProvider::Gemini)
            .with_model("gemini-pro")
            .with_cache_directory("/tmp/semstep");
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["oracle_provider"], "gemini");
        assert_eq!(json["model_name"], "gemini-pro");
        assert_eq!(json["cache_directory"], "/tmp/semstep");
    }
}
