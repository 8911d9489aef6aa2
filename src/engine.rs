//! Fuzzy step matching engine.
//!
//! [`MatchEngine`] is what a host runner calls after its own regex lookup finds
//! nothing. It asks the oracle which registered pattern the step text means,
//! accepts the answer only above the confidence threshold, maps the named
//! pattern back to a catalog entry and synthesizes handler arguments.
//!
//! ```text
//! query ─▶ business subset ─▶ cache ─┬─ hit ───────────────┐
//!                                    └─ miss ─▶ oracle ─────┤
//!                                                           ▼
//!           MatchResult ◀─ synthesize ◀─ reconcile ◀─ confidence gate
//! ```
//!
//! Every failure along the way ends in `None`; nothing is raised to the host.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::{FileVerdictStore, ResultCache};
use crate::catalog::{business_subset_with, DEFAULT_DIAGNOSTIC_MARKERS};
use crate::confidence::{Confidence, ConfidenceGate};
use crate::config::MatcherConfig;
use crate::error::SemstepResult;
use crate::oracle::{Oracle, OracleClient};
use crate::pattern::{CaptureArgument, HandlerResult, StepPattern};
use crate::reconcile;
use crate::synth::{self, SynthesisOutcome};
use crate::verdict::OracleVerdict;

/// A step text resolved to a registered pattern by the oracle.
#[derive(Debug, Clone)]
pub struct MatchResult {
    /// The catalog entry the oracle chose.
    pub pattern: Arc<StepPattern>,
    /// The step text that had no native match.
    pub query_text: String,
    /// Arguments for the pattern's handler.
    pub captured_arguments: Vec<CaptureArgument>,
    /// The rebuilt step text the arguments were captured from, if any.
    pub synthesized_text: Option<String>,
    /// The oracle's confidence in the match.
    pub confidence: Confidence,
}

impl MatchResult {
    /// The captured values, in group order.
    #[must_use]
    pub fn argument_values(&self) -> Vec<&str> {
        self.captured_arguments
            .iter()
            .map(CaptureArgument::as_str)
            .collect()
    }

    /// Runs the matched pattern's handler with the captured arguments.
    ///
    /// # Errors
    ///
    /// Returns the handler's failure message.
    pub fn invoke(&self) -> HandlerResult {
        self.pattern.invoke(&self.captured_arguments)
    }
}

/// Fallback lookup a host runner calls when no pattern matches natively.
pub trait FallbackMatcher: Send + Sync {
    /// Resolves `query_text` against `available_patterns`, or returns `None`.
    fn find_match(
        &self,
        query_text: &str,
        available_patterns: &[Arc<StepPattern>],
    ) -> Option<MatchResult>;
}

/// Counters describing what the engine has done.
#[derive(Debug, Default)]
pub struct MatchStats {
    lookups: AtomicU64,
    cache_hits: AtomicU64,
    oracle_calls: AtomicU64,
    oracle_failures: AtomicU64,
    gate_rejections: AtomicU64,
    unresolved: AtomicU64,
    matches: AtomicU64,
}

/// Point-in-time copy of [`MatchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Calls to `find_match`.
    pub lookups: u64,
    /// Verdicts served from the cache.
    pub cache_hits: u64,
    /// Requests sent to the oracle.
    pub oracle_calls: u64,
    /// Oracle requests that failed or returned an unreadable answer.
    pub oracle_failures: u64,
    /// Verdicts below the threshold or answering "no".
    pub gate_rejections: u64,
    /// Accepted verdicts naming no known pattern.
    pub unresolved: u64,
    /// Lookups that produced a match.
    pub matches: u64,
}

impl MatchStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a snapshot of the counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            lookups: self.lookups.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            oracle_calls: self.oracle_calls.load(Ordering::Relaxed),
            oracle_failures: self.oracle_failures.load(Ordering::Relaxed),
            gate_rejections: self.gate_rejections.load(Ordering::Relaxed),
            unresolved: self.unresolved.load(Ordering::Relaxed),
            matches: self.matches.load(Ordering::Relaxed),
        }
    }
}

/// Oracle-backed [`FallbackMatcher`].
#[derive(Debug)]
pub struct MatchEngine {
    client: OracleClient,
    gate: ConfidenceGate,
    cache: Option<ResultCache>,
    markers: Vec<String>,
    stats: MatchStats,
}

impl MatchEngine {
    /// Creates an engine without a cache.
    #[must_use]
    pub fn new(client: OracleClient, gate: ConfidenceGate) -> Self {
        Self {
            client,
            gate,
            cache: None,
            markers: DEFAULT_DIAGNOSTIC_MARKERS
                .iter()
                .map(|m| (*m).to_string())
                .collect(),
            stats: MatchStats::default(),
        }
    }

    /// Builds an engine from configuration.
    ///
    /// When caching is enabled the cache directory is created up front.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an invalid configuration and a cache
    /// error if the cache directory cannot be created.
    pub fn from_config(config: &MatcherConfig, oracle: Arc<dyn Oracle>) -> SemstepResult<Self> {
        let config = config.clone().validate()?;
        let gate = ConfidenceGate::new(config.confidence_threshold)?;
        let client = OracleClient::new(oracle, config.oracle_provider, config.model_name);
        let engine = Self::new(client, gate);

        if !config.cache_enabled {
            return Ok(engine);
        }

        let store = FileVerdictStore::new(config.cache_directory);
        store.ensure_dir()?;
        tracing::debug!(dir = %store.dir().display(), "verdict cache enabled");
        Ok(engine.with_cache(ResultCache::new(Arc::new(store))))
    }

    /// Caches verdicts in `cache`.
    #[must_use]
    pub fn with_cache(mut self, cache: ResultCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Replaces the markers identifying diagnostic patterns.
    #[must_use]
    pub fn with_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.markers = markers.into_iter().map(Into::into).collect();
        self
    }

    /// The oracle client.
    #[must_use]
    pub fn client(&self) -> &OracleClient {
        &self.client
    }

    /// The confidence gate.
    #[must_use]
    pub fn gate(&self) -> &ConfidenceGate {
        &self.gate
    }

    /// The verdict cache, if enabled.
    #[must_use]
    pub fn cache(&self) -> Option<&ResultCache> {
        self.cache.as_ref()
    }

    /// Current counter values.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Gets a verdict for the query, from the cache when possible.
    ///
    /// The cache key covers every available pattern while the oracle only sees
    /// the business subset. A failed oracle call yields the no-match verdict,
    /// which is cached like any other answer.
    fn verdict_for(
        &self,
        query_text: &str,
        all: &[Arc<StepPattern>],
        business: &[Arc<StepPattern>],
    ) -> OracleVerdict {
        let ask = || {
            MatchStats::bump(&self.stats.oracle_calls);
            self.client.try_query(query_text, business).unwrap_or_else(|e| {
                MatchStats::bump(&self.stats.oracle_failures);
                self.client.log_failure(query_text, &e);
                OracleVerdict::no_match()
            })
        };

        let Some(cache) = &self.cache else {
            return ask();
        };

        let sources: Vec<&str> = all.iter().map(|p| p.raw_source()).collect();
        let lookup = cache.get_or_fetch(query_text, &sources, ask);
        if lookup.hit {
            MatchStats::bump(&self.stats.cache_hits);
        }
        lookup.verdict
    }
}

impl FallbackMatcher for MatchEngine {
    fn find_match(
        &self,
        query_text: &str,
        available_patterns: &[Arc<StepPattern>],
    ) -> Option<MatchResult> {
        MatchStats::bump(&self.stats.lookups);

        if available_patterns.is_empty() {
            tracing::debug!(query = %query_text, "no patterns registered, skipping oracle");
            return None;
        }

        let business = business_subset_with(available_patterns, self.markers.as_slice());
        let verdict = self.verdict_for(query_text, available_patterns, &business);

        if !self.gate.accepts(&verdict) {
            MatchStats::bump(&self.stats.gate_rejections);
            tracing::debug!(
                query = %query_text,
                match_found = verdict.match_found,
                confidence = %verdict.confidence,
                threshold = self.gate.threshold(),
                "oracle verdict rejected"
            );
            return None;
        }

        let Some(pattern) = reconcile::resolve(&verdict.chosen_pattern_text, available_patterns)
        else {
            MatchStats::bump(&self.stats.unresolved);
            tracing::warn!(
                query = %query_text,
                chosen = %verdict.chosen_pattern_text,
                "oracle chose a pattern that is not registered"
            );
            return None;
        };

        let synthesis = synth::synthesize(&pattern, &verdict.parameter_values);
        MatchStats::bump(&self.stats.matches);
        tracing::info!(
            query = %query_text,
            pattern = %pattern.raw_source(),
            confidence = %verdict.confidence,
            arguments = synthesis.arguments.len(),
            rematched = synthesis.outcome == SynthesisOutcome::Rematched,
            "fuzzy step match accepted"
        );

        Some(MatchResult {
            pattern,
            query_text: query_text.to_string(),
            captured_arguments: synthesis.arguments,
            synthesized_text: synthesis.synthesized_text,
            confidence: verdict.confidence,
        })
    }
}
