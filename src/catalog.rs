//! Pattern catalog.
//!
//! Holds the registered step patterns in declaration order. The catalog is
//! append-only; readers get cheap `Arc` snapshots and may match concurrently.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{SemstepError, SemstepResult};
use crate::pattern::StepPattern;

/// Substrings marking the suite's own self-verification steps.
///
/// Patterns containing any of these are kept out of the oracle's candidate list.
pub const DEFAULT_DIAGNOSTIC_MARKERS: &[&str] = &[
    "should have executed",
    "configured for testing",
    "test",
    "verification",
];

fn lock_err(context: &'static str) -> SemstepError {
    SemstepError::internal(format!("poisoned lock: {context}"))
}

/// Registered step patterns.
#[derive(Debug)]
pub struct PatternCatalog {
    patterns: RwLock<Vec<Arc<StepPattern>>>,
    markers: Vec<String>,
}

impl Default for PatternCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternCatalog {
    /// Creates an empty catalog using [`DEFAULT_DIAGNOSTIC_MARKERS`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_markers(DEFAULT_DIAGNOSTIC_MARKERS.iter().copied())
    }

    /// Creates an empty catalog with a custom diagnostic marker list.
    #[must_use]
    pub fn with_markers<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: RwLock::new(Vec::new()),
            markers: markers.into_iter().map(Into::into).collect(),
        }
    }

    /// Appends a pattern and returns the shared handle.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the catalog lock is poisoned.
    pub fn register(&self, pattern: StepPattern) -> SemstepResult<Arc<StepPattern>> {
        let pattern = Arc::new(pattern);
        self.patterns
            .write()
            .map_err(|_| lock_err("catalog.register"))?
            .push(Arc::clone(&pattern));
        Ok(pattern)
    }

    /// Every registered pattern, in registration order.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the catalog lock is poisoned.
    pub fn all(&self) -> SemstepResult<Vec<Arc<StepPattern>>> {
        Ok(self
            .patterns
            .read()
            .map_err(|_| lock_err("catalog.all"))?
            .clone())
    }

    /// Registered patterns with later duplicates of the same source removed.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the catalog lock is poisoned.
    pub fn distinct(&self) -> SemstepResult<Vec<Arc<StepPattern>>> {
        Ok(distinct(&self.all()?))
    }

    /// Patterns suitable for the oracle's menu.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the catalog lock is poisoned.
    pub fn business_subset(&self) -> SemstepResult<Vec<Arc<StepPattern>>> {
        Ok(business_subset_with(&self.all()?, self.markers.as_slice()))
    }

    /// Number of registered patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The diagnostic markers this catalog filters on.
    #[must_use]
    pub fn markers(&self) -> &[String] {
        &self.markers
    }
}

/// Drops later patterns whose source repeats an earlier one.
#[must_use]
pub fn distinct(patterns: &[Arc<StepPattern>]) -> Vec<Arc<StepPattern>> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(patterns.len());
    for p in patterns {
        if seen.insert(p.raw_source()) {
            out.push(Arc::clone(p));
        }
    }
    out
}

/// [`business_subset_with`] using [`DEFAULT_DIAGNOSTIC_MARKERS`].
#[must_use]
pub fn business_subset(patterns: &[Arc<StepPattern>]) -> Vec<Arc<StepPattern>> {
    business_subset_with(patterns, DEFAULT_DIAGNOSTIC_MARKERS)
}

/// Removes patterns whose source literally contains any marker.
///
/// Falls back to the full input when the filter would leave nothing.
#[must_use]
pub fn business_subset_with<S: AsRef<str>>(
    patterns: &[Arc<StepPattern>],
    markers: &[S],
) -> Vec<Arc<StepPattern>> {
    let filtered: Vec<_> = patterns
        .iter()
        .filter(|p| {
            !markers
                .iter()
                .any(|m| p.raw_source().contains(m.as_ref()))
        })
        .cloned()
        .collect();

    if filtered.is_empty() {
        patterns.to_vec()
    } else {
        filtered
    }
}
