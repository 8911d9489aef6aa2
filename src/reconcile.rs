//! Pattern reconciliation.
//!
//! The oracle names its chosen pattern as free text. Models drift on formatting:
//! they drop or add the `/…/` delimiters and escape quotes that were never
//! escaped. Reconciliation maps that text back to a catalog entry by trying a
//! fixed sequence of normalizations. It never guesses a pattern the oracle did
//! not name.

use std::sync::Arc;

use crate::pattern::{strip_delimiters, wrap_delimiters, StepPattern};

/// The normalization that identified a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReconcileRule {
    /// Exact source equality.
    Exact,
    /// The oracle omitted the delimiters.
    AddedDelimiters,
    /// Equal once delimiters are stripped from both sides.
    StrippedDelimiters,
    /// The oracle escaped quotes.
    UnescapedQuotes,
    /// Stripped delimiters and unescaped quotes.
    StrippedAndUnescaped,
}

impl ReconcileRule {
    /// Every rule, in the order they are tried.
    pub const ORDER: [Self; 5] = [
        Self::Exact,
        Self::AddedDelimiters,
        Self::StrippedDelimiters,
        Self::UnescapedQuotes,
        Self::StrippedAndUnescaped,
    ];

    fn matches(self, chosen: &str, source: &str) -> bool {
        match self {
            Self::Exact => source == chosen,
            Self::AddedDelimiters => source == wrap_delimiters(chosen),
            Self::StrippedDelimiters => strip_delimiters(source) == strip_delimiters(chosen),
            Self::UnescapedQuotes => source == unescape_quotes(chosen),
            Self::StrippedAndUnescaped => {
                strip_delimiters(source) == unescape_quotes(strip_delimiters(chosen))
            }
        }
    }
}

/// Replaces `\"` and `\'` with the bare quote.
#[must_use]
pub fn unescape_quotes(text: &str) -> String {
    text.replace("\\\"", "\"").replace("\\'", "'")
}

/// Resolves the oracle's chosen-pattern text against the candidates.
///
/// Rules are tried in [`ReconcileRule::ORDER`]; within a rule the first candidate
/// in catalog order wins.
#[must_use]
pub fn resolve(chosen: &str, candidates: &[Arc<StepPattern>]) -> Option<Arc<StepPattern>> {
    resolve_with_rule(chosen, candidates).map(|(pattern, _)| pattern)
}

/// Like [`resolve`], also reporting which rule matched.
#[must_use]
pub fn resolve_with_rule(
    chosen: &str,
    candidates: &[Arc<StepPattern>],
) -> Option<(Arc<StepPattern>, ReconcileRule)> {
    if chosen.trim().is_empty() {
        return None;
    }

    for rule in ReconcileRule::ORDER {
        let mut hits = candidates
            .iter()
            .filter(|p| rule.matches(chosen, p.raw_source()));

        if let Some(first) = hits.next() {
            let others = hits.count();
            if others > 0 {
                tracing::debug!(
                    chosen = %chosen,
                    rule = ?rule,
                    ambiguous = others + 1,
                    "several patterns reconcile to the oracle's choice, taking the first"
                );
            }
            return Some((Arc::clone(first), rule));
        }
    }

    tracing::debug!(chosen = %chosen, "oracle's choice does not name any candidate");
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUTTON: &str = r#"/^they click the "([^"]*)" button$/"#;

    fn candidates() -> Vec<Arc<StepPattern>> {
        [
            "/^the user has logged in to their account$/",
            BUTTON,
            "/^they should see a confirmation message$/",
        ]
        .into_iter()
        .map(|s| Arc::new(StepPattern::unbound(s).unwrap()))
        .collect()
    }

    #[test]
    fn test_exact() {
        let (p, rule) = resolve_with_rule(BUTTON, &candidates()).unwrap();
        assert_eq!(p.raw_source(), BUTTON);
        assert_eq!(rule, ReconcileRule::Exact);
    }

    #[test]
    fn test_without_delimiters() {
        let (p, rule) =
            resolve_with_rule(r#"^they click the "([^"]*)" button$"#, &candidates()).unwrap();
        assert_eq!(p.raw_source(), BUTTON);
        assert_eq!(rule, ReconcileRule::AddedDelimiters);
    }

    #[test]
    fn test_half_delimited() {
        let (p, rule) =
            resolve_with_rule(r#"/^they click the "([^"]*)" button$"#, &candidates()).unwrap();
        assert_eq!(p.raw_source(), BUTTON);
        assert_eq!(rule, ReconcileRule::StrippedDelimiters);
    }

    #[test]
    fn test_escaped_quotes() {
        let (p, rule) =
            resolve_with_rule(r#"/^they click the \"([^\"]*)\" button$/"#, &candidates()).unwrap();
        assert_eq!(p.raw_source(), BUTTON);
        assert_eq!(rule, ReconcileRule::UnescapedQuotes);
    }

    #[test]
    fn test_escaped_quotes_without_delimiters() {
        let (p, rule) =
            resolve_with_rule(r#"^they click the \"([^\"]*)\" button$"#, &candidates()).unwrap();
        assert_eq!(p.raw_source(), BUTTON);
        assert_eq!(rule, ReconcileRule::StrippedAndUnescaped);
    }

    #[test]
    fn test_unknown_pattern_is_none() {
        assert!(resolve("/^they dance$/", &candidates()).is_none());
        assert!(resolve("", &candidates()).is_none());
        assert!(resolve("  ", &candidates()).is_none());
        assert!(resolve(BUTTON, &[]).is_none());
    }

    #[test]
    fn test_ambiguity_takes_first_in_catalog_order() {
        // Both normalize to "^they wave$" once delimiters are stripped.
        let leading = Arc::new(StepPattern::unbound("/^they wave$").unwrap());
        let trailing = Arc::new(StepPattern::unbound("^they wave$/").unwrap());

        let forward = vec![Arc::clone(&leading), Arc::clone(&trailing)];
        let (hit, rule) = resolve_with_rule("/^they wave$/", &forward).unwrap();
        assert_eq!(rule, ReconcileRule::StrippedDelimiters);
        assert!(Arc::ptr_eq(&hit, &leading));

        let backward = vec![Arc::clone(&trailing), Arc::clone(&leading)];
        let hit = resolve("/^they wave$/", &backward).unwrap();
        assert!(Arc::ptr_eq(&hit, &trailing));
    }

    #[test]
    fn test_earlier_rule_beats_catalog_order() {
        let delimited = Arc::new(StepPattern::unbound("/they wave/").unwrap());
        let bare = Arc::new(StepPattern::unbound("they wave").unwrap());
        let candidates = vec![Arc::clone(&delimited), Arc::clone(&bare)];
        let (hit, rule) = resolve_with_rule("they wave", &candidates).unwrap();
        assert_eq!(rule, ReconcileRule::Exact);
        assert!(Arc::ptr_eq(&hit, &bare));
    }

    #[test]
    fn test_exact_duplicates_take_first() {
        let a = Arc::new(StepPattern::unbound("/^x$/").unwrap());
        let b = Arc::new(StepPattern::unbound("/^x$/").unwrap());
        let hit = resolve("/^x$/", &[Arc::clone(&a), b]).unwrap();
        assert!(Arc::ptr_eq(&hit, &a));
    }

    #[test]
    fn test_unescape_quotes() {
        assert_eq!(unescape_quotes(r#"say \"hi\""#), r#"say "hi""#);
        assert_eq!(unescape_quotes(r"it\'s"), "it's");
        assert_eq!(unescape_quotes("plain"), "plain");
    }
}
