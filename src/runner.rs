//! Reference host runner.
//!
//! [`StepRunner`] shows how a behavior-driven test runner wires in a
//! [`FallbackMatcher`]: native regex lookup first, and only when nothing matches
//! natively is the fallback asked. Ambiguous native matches stay an error; the
//! fallback never breaks ties.

use std::sync::Arc;

use crate::catalog::PatternCatalog;
use crate::confidence::Confidence;
use crate::engine::FallbackMatcher;
use crate::error::{SemstepResult, StepError};
use crate::pattern::{CaptureArgument, StepHandler, StepPattern};

/// How a step was resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchSource {
    /// The pattern matched the step text directly.
    Native,
    /// The fallback matcher chose the pattern.
    Fallback {
        /// How sure the fallback was of its choice.
        confidence: Confidence,
        /// The rebuilt step text the arguments came from, when it matched.
        synthesized_text: Option<String>,
    },
}

/// A step text bound to the pattern that will run it.
#[derive(Debug, Clone)]
pub struct ResolvedStep {
    /// The pattern whose handler runs the step.
    pub pattern: Arc<StepPattern>,
    /// Handler arguments.
    pub arguments: Vec<CaptureArgument>,
    /// How the pattern was found.
    pub source: MatchSource,
}

impl ResolvedStep {
    /// Returns true if the fallback matcher produced this step.
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        matches!(self.source, MatchSource::Fallback { .. })
    }
}

/// Minimal step runner over a [`PatternCatalog`].
pub struct StepRunner {
    catalog: PatternCatalog,
    fallback: Option<Arc<dyn FallbackMatcher>>,
}

impl std::fmt::Debug for StepRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepRunner")
            .field("catalog", &self.catalog)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

impl StepRunner {
    /// Creates a runner with native matching only.
    #[must_use]
    pub fn new(catalog: PatternCatalog) -> Self {
        Self {
            catalog,
            fallback: None,
        }
    }

    /// Consults `fallback` for steps with no native match.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackMatcher>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// The registered step definitions.
    #[must_use]
    pub fn catalog(&self) -> &PatternCatalog {
        &self.catalog
    }

    /// Registers a step definition.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `source` is not a valid pattern.
    pub fn define(
        &self,
        source: impl Into<String>,
        handler: impl StepHandler + 'static,
    ) -> SemstepResult<Arc<StepPattern>> {
        self.catalog.register(StepPattern::new(source, handler)?)
    }

    /// Finds the pattern for `text` without running it.
    ///
    /// # Errors
    ///
    /// Returns `StepError::Ambiguous` when several patterns match natively and
    /// `StepError::Undefined` when neither native lookup nor the fallback
    /// resolves the text.
    pub fn resolve(&self, text: &str) -> Result<ResolvedStep, StepError> {
        let patterns = self.catalog.all()?;

        let mut native = patterns
            .iter()
            .filter_map(|p| p.arguments_from(text).map(|args| (p, args)))
            .collect::<Vec<_>>();

        if native.len() > 1 {
            return Err(StepError::Ambiguous {
                text: text.to_string(),
                candidates: native
                    .iter()
                    .map(|(p, _)| p.raw_source().to_string())
                    .collect(),
            });
        }

        if let Some((pattern, arguments)) = native.pop() {
            return Ok(ResolvedStep {
                pattern: Arc::clone(pattern),
                arguments,
                source: MatchSource::Native,
            });
        }

        let found = self
            .fallback
            .as_ref()
            .and_then(|fallback| fallback.find_match(text, &patterns));

        match found {
            Some(m) => Ok(ResolvedStep {
                pattern: m.pattern,
                arguments: m.captured_arguments,
                source: MatchSource::Fallback {
                    confidence: m.confidence,
                    synthesized_text: m.synthesized_text,
                },
            }),
            None => Err(StepError::Undefined {
                text: text.to_string(),
            }),
        }
    }

    /// Resolves `text` and runs its handler.
    ///
    /// # Errors
    ///
    /// Returns the resolution errors of [`StepRunner::resolve`], and
    /// `StepError::HandlerFailed` when the handler reports a failure.
    pub fn run(&self, text: &str) -> Result<ResolvedStep, StepError> {
        let step = self.resolve(text)?;
        step.pattern
            .invoke(&step.arguments)
            .map_err(|message| StepError::HandlerFailed {
                text: text.to_string(),
                pattern: step.pattern.raw_source().to_string(),
                message,
            })?;
        Ok(step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::engine::MatchResult;
    use crate::pattern::HandlerResult;

    /// Always answers with the first pattern, echoing the text as the only value.
    struct FirstPattern;

    impl FallbackMatcher for FirstPattern {
        fn find_match(&self, text: &str, patterns: &[Arc<StepPattern>]) -> Option<MatchResult> {
            let pattern = Arc::clone(patterns.first()?);
            Some(MatchResult {
                pattern,
                query_text: text.to_string(),
                captured_arguments: vec![CaptureArgument::detached(text, 1)],
                synthesized_text: None,
                confidence: Confidence::new(0.8).ok()?,
            })
        }
    }

    #[test]
    fn test_native_match_runs_handler() {
        let runner = StepRunner::new(PatternCatalog::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        runner
            .define(r"/^they wait (\d+) seconds$/", move |args: &[CaptureArgument]| -> HandlerResult {
                sink.lock().unwrap().push(args[0].value.clone());
                Ok(())
            })
            .unwrap();

        let step = runner.run("they wait 3 seconds").unwrap();
        assert_eq!(step.source, MatchSource::Native);
        assert_eq!(step.arguments, vec![CaptureArgument::new("3", 1, 10)]);
        assert_eq!(*seen.lock().unwrap(), vec!["3".to_string()]);
    }

    #[test]
    fn test_undefined_without_fallback() {
        let runner = StepRunner::new(PatternCatalog::new());
        runner
            .define("/^they wave$/", |_: &[CaptureArgument]| -> HandlerResult { Ok(()) })
            .unwrap();
        assert!(matches!(
            runner.resolve("they salute"),
            Err(StepError::Undefined { .. })
        ));
    }

    #[test]
    fn test_fallback_used_only_after_native_miss() {
        let runner = StepRunner::new(PatternCatalog::new()).with_fallback(Arc::new(FirstPattern));
        runner
            .define("/^they wave$/", |_: &[CaptureArgument]| -> HandlerResult { Ok(()) })
            .unwrap();

        assert_eq!(runner.resolve("they wave").unwrap().source, MatchSource::Native);

        let step = runner.resolve("they salute").unwrap();
        assert!(step.is_fallback());
        assert_eq!(step.pattern.raw_source(), "/^they wave$/");
    }

    #[test]
    fn test_ambiguous_native_match_is_error_even_with_fallback() {
        let runner = StepRunner::new(PatternCatalog::new()).with_fallback(Arc::new(FirstPattern));
        runner
            .define("/^they wave$/", |_: &[CaptureArgument]| -> HandlerResult { Ok(()) })
            .unwrap();
        runner
            .define("/wave/", |_: &[CaptureArgument]| -> HandlerResult { Ok(()) })
            .unwrap();

        match runner.resolve("they wave") {
            Err(StepError::Ambiguous { candidates, .. }) => {
                assert_eq!(candidates, vec!["/^they wave$/", "/wave/"]);
            }
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }

    #[test]
    fn test_handler_failure_is_reported() {
        let runner = StepRunner::new(PatternCatalog::new());
        runner
            .define("/^it breaks$/", |_: &[CaptureArgument]| -> HandlerResult {
                Err("boom".to_string())
            })
            .unwrap();

        match runner.run("it breaks") {
            Err(StepError::HandlerFailed { pattern, message, .. }) => {
                assert_eq!(pattern, "/^it breaks$/");
                assert_eq!(message, "boom");
            }
            other => panic!("expected handler failure, got {other:?}"),
        }
    }

    #[test]
    fn test_define_rejects_bad_regex() {
        let runner = StepRunner::new(PatternCatalog::new());
        let err = runner
            .define("/^(unclosed$/", |_: &[CaptureArgument]| -> HandlerResult { Ok(()) })
            .unwrap_err();
        assert!(err.is_validation());
        assert!(runner.catalog().is_empty());
    }
}
