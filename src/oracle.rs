//! Oracle client.
//!
//! The oracle is the external semantic matcher (an LLM behind some provider).
//! Its transport is opaque to this crate: anything implementing [`Oracle`] can
//! answer a request. [`OracleClient`] wraps an oracle with the matching policy:
//! it builds the request, normalizes the response and absorbs every failure into
//! the canonical no-match verdict.

use std::collections::HashMap;
use std::fmt::{self, Write as _};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::OracleError;
use crate::pattern::StepPattern;
use crate::verdict::{OracleVerdict, RawOracleResponse};

/// LLM provider the oracle should route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleProvider {
    /// OpenAI chat models.
    #[default]
    OpenAi,
    /// Anthropic Claude models.
    Claude,
    /// Google Gemini models.
    Gemini,
}

impl fmt::Display for OracleProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAi => write!(f, "open_ai"),
            Self::Claude => write!(f, "claude"),
            Self::Gemini => write!(f, "gemini"),
        }
    }
}

/// A request for the oracle to pick the best-fitting step pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleRequest {
    /// The unmatched step text.
    pub query_text: String,
    /// Candidate pattern sources, in catalog order.
    pub candidate_patterns: Vec<String>,
    /// Provider selection.
    pub provider: OracleProvider,
    /// Model name.
    pub model: String,
}

impl OracleRequest {
    /// Renders the instruction text a transport sends to the model.
    #[must_use]
    pub fn prompt(&self) -> String {
        let mut prompt = String::from(
            "You match a behavior-driven test step against registered step definitions.\n\
             Pick the single definition whose meaning best fits the step, even if the wording \
             differs.\n\n",
        );
        prompt.push_str("Step:\n");
        prompt.push_str(&self.query_text);
        prompt.push_str("\n\nStep definitions (regular expressions):\n");
        for (i, pattern) in self.candidate_patterns.iter().enumerate() {
            let _ = writeln!(prompt, "{}. {pattern}", i + 1);
        }
        prompt.push_str(
            "\nAnswer with these fields:\n\
             - match_found: \"yes\" or \"no\"\n\
             - best_match_pattern: the chosen definition, copied exactly as listed\n\
             - confidence: a decimal between 0.0 and 1.0\n\
             - parameter_values: the values for the definition's capture groups, in order, \
             separated by commas (empty if none)\n",
        );
        prompt
    }
}

/// Consumed oracle interface.
///
/// Implementations own transport concerns, including timeouts, and report
/// them as [`OracleError`].
pub trait Oracle: Send + Sync {
    /// Asks the oracle which candidate best fits the query.
    fn request_match(&self, request: &OracleRequest) -> Result<RawOracleResponse, OracleError>;
}

/// Builds oracle requests and normalizes their answers.
#[derive(Clone)]
pub struct OracleClient {
    oracle: Arc<dyn Oracle>,
    provider: OracleProvider,
    model: String,
}

impl fmt::Debug for OracleClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OracleClient")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OracleClient {
    /// Creates a client routing to the given provider and model.
    #[must_use]
    pub fn new(oracle: Arc<dyn Oracle>, provider: OracleProvider, model: impl Into<String>) -> Self {
        Self {
            oracle,
            provider,
            model: model.into(),
        }
    }

    /// Provider selection.
    #[must_use]
    pub const fn provider(&self) -> OracleProvider {
        self.provider
    }

    /// Model name.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Builds the request for a query against the given candidates.
    #[must_use]
    pub fn build_request(&self, text: &str, candidates: &[Arc<StepPattern>]) -> OracleRequest {
        OracleRequest {
            query_text: text.to_string(),
            candidate_patterns: candidates
                .iter()
                .map(|p| p.raw_source().to_string())
                .collect(),
            provider: self.provider,
            model: self.model.clone(),
        }
    }

    /// Asks the oracle and normalizes its answer.
    ///
    /// # Errors
    ///
    /// Returns the oracle's transport error, or `OracleError::MalformedResponse`
    /// if the answer cannot be normalized.
    pub fn try_query(
        &self,
        text: &str,
        candidates: &[Arc<StepPattern>],
    ) -> Result<OracleVerdict, OracleError> {
        let request = self.build_request(text, candidates);
        let raw = self.oracle.request_match(&request)?;
        OracleVerdict::from_raw(&raw).map_err(|e| OracleError::MalformedResponse {
            message: e.to_string(),
        })
    }

    /// Asks the oracle and returns a normalized verdict.
    ///
    /// Transport and normalization failures yield [`OracleVerdict::no_match`].
    #[must_use]
    pub fn query(&self, text: &str, candidates: &[Arc<StepPattern>]) -> OracleVerdict {
        self.try_query(text, candidates).unwrap_or_else(|e| {
            self.log_failure(text, &e);
            OracleVerdict::no_match()
        })
    }

    pub(crate) fn log_failure(&self, text: &str, error: &OracleError) {
        tracing::warn!(
            query = %text,
            provider = %self.provider,
            model = %self.model,
            error = %error,
            retryable = error.is_retryable(),
            "oracle request failed, falling back to no match"
        );
    }
}

/// In-process oracle answering from canned responses keyed by query text.
///
/// Unknown queries get a "no" answer. Useful for offline runs and for tests
/// that must not depend on a live model.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    responses: RwLock<HashMap<String, RawOracleResponse>>,
}

impl ScriptedOracle {
    /// Creates an oracle with no scripted answers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the answer for `query_text`.
    #[must_use]
    pub fn with_response(self, query_text: impl Into<String>, response: RawOracleResponse) -> Self {
        self.script(query_text, response);
        self
    }

    /// Adds (or replaces) the answer for `query_text` in place.
    pub fn script(&self, query_text: impl Into<String>, response: RawOracleResponse) {
        self.responses
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(query_text.into(), response);
    }
}

impl Oracle for ScriptedOracle {
    fn request_match(&self, request: &OracleRequest) -> Result<RawOracleResponse, OracleError> {
        let responses = self.responses.read().unwrap_or_else(PoisonError::into_inner);
        Ok(responses
            .get(&request.query_text)
            .cloned()
            .unwrap_or_else(RawOracleResponse::no_match))
    }
}
