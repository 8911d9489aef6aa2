//! # semstep - Semantic fallback matching for behavior-driven test steps
//!
//! A behavior-driven test runner maps each plain-language step ("they click the
//! \"Buy Now\" button") to a registered step definition by regular expression.
//! When no definition matches, semstep asks an LLM oracle which definition the
//! step *means*, and hands the runner a match it can execute as if the regex had
//! matched.
//!
//! ## Core Concepts
//!
//! - **StepPattern**: A registered step definition: its regex source and handler
//! - **Oracle**: The external semantic matcher, behind the [`Oracle`] trait
//! - **ConfidenceGate**: Rejects verdicts below the configured threshold
//! - **Reconciliation**: Maps the oracle's loosely formatted choice back to a pattern
//! - **Synthesis**: Rebuilds capture arguments from the oracle's parameter values
//! - **ResultCache**: Content-addressed verdict cache, in memory or on disk
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use semstep::{MatchEngine, MatcherConfig, PatternCatalog, StepRunner};
//!
//! let engine = MatchEngine::from_config(&MatcherConfig::default(), Arc::new(my_oracle))?;
//! let runner = StepRunner::new(PatternCatalog::new()).with_fallback(Arc::new(engine));
//! runner.define(r#"/^they click the "([^"]*)" button$/"#, click_button)?;
//!
//! // No regex matches this wording; the oracle resolves it.
//! runner.run(r#"they press the "Buy Now" button"#)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod confidence;
pub mod error;
pub mod pattern;
pub mod verdict;

// Matching pipeline
pub mod cache;
pub mod catalog;
pub mod oracle;
pub mod reconcile;
pub mod synth;

// Engine and host integration
pub mod config;
pub mod engine;
pub mod runner;

// Re-export primary types at crate root for convenience
pub use cache::{
    CacheEntry, CacheKey, CacheLookup, FileVerdictStore, InMemoryVerdictStore, ResultCache,
    VerdictStore,
};
pub use catalog::{PatternCatalog, DEFAULT_DIAGNOSTIC_MARKERS};
pub use confidence::{Confidence, ConfidenceGate};
pub use config::MatcherConfig;
pub use engine::{FallbackMatcher, MatchEngine, MatchResult, MatchStats, StatsSnapshot};
pub use error::{
    CacheError, OracleError, SemstepError, SemstepResult, StepError, SynthesisError,
    ValidationError,
};
pub use oracle::{Oracle, OracleClient, OracleProvider, OracleRequest, ScriptedOracle};
pub use pattern::{CaptureArgument, HandlerResult, StepHandler, StepPattern};
pub use reconcile::ReconcileRule;
pub use runner::{MatchSource, ResolvedStep, StepRunner};
pub use synth::{Synthesis, SynthesisOutcome};
pub use verdict::{OracleVerdict, RawOracleResponse};
