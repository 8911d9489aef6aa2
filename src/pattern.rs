//! Step patterns.
//!
//! A step pattern is a registered regular expression paired with the handler the
//! host runner invokes when a step matches it. Sources are kept exactly as
//! declared (`/^they click the "([^"]*)" button$/`), since that text is what the
//! oracle sees and what reconciliation compares against.

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Delimiter wrapping a regex step source.
pub const DELIMITER: char = '/';

/// One captured step argument.
///
/// Mirrors what a host runner produces for a native regex match: the captured
/// text, its group number and, when known, its byte offset in the matched text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaptureArgument {
    /// Captured text.
    pub value: String,
    /// 1-based capture group number.
    pub group_index: usize,
    /// Byte offset of the capture in the text the pattern matched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

impl CaptureArgument {
    /// Creates an argument with a known position.
    #[must_use]
    pub fn new(value: impl Into<String>, group_index: usize, offset: usize) -> Self {
        Self {
            value: value.into(),
            group_index,
            offset: Some(offset),
        }
    }

    /// Creates an argument with no position in any matched text.
    #[must_use]
    pub fn detached(value: impl Into<String>, group_index: usize) -> Self {
        Self {
            value: value.into(),
            group_index,
            offset: None,
        }
    }

    /// Returns the captured text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for CaptureArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl AsRef<str> for CaptureArgument {
    fn as_ref(&self) -> &str {
        &self.value
    }
}

/// Result of running a step handler.
pub type HandlerResult = Result<(), String>;

/// Executable body of a step.
pub trait StepHandler: Send + Sync {
    /// Runs the step with its captured arguments.
    fn call(&self, args: &[CaptureArgument]) -> HandlerResult;
}

impl<F> StepHandler for F
where
    F: Fn(&[CaptureArgument]) -> HandlerResult + Send + Sync,
{
    fn call(&self, args: &[CaptureArgument]) -> HandlerResult {
        self(args)
    }
}

/// A registered step pattern.
pub struct StepPattern {
    raw_source: String,
    matcher: Regex,
    handler: Arc<dyn StepHandler>,
}

impl StepPattern {
    /// Creates a step pattern from its declared source.
    ///
    /// A `/…/`-delimited source is compiled as written. A bare source is treated
    /// as a whole-step pattern and anchored at both ends.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyPattern` for a blank source and
    /// `InvalidPattern` when the regex does not compile.
    pub fn new(
        raw_source: impl Into<String>,
        handler: impl StepHandler + 'static,
    ) -> Result<Self, ValidationError> {
        Self::with_handler(raw_source, Arc::new(handler))
    }

    /// Creates a step pattern sharing an existing handler.
    ///
    /// # Errors
    ///
    /// Same as [`StepPattern::new`].
    pub fn with_handler(
        raw_source: impl Into<String>,
        handler: Arc<dyn StepHandler>,
    ) -> Result<Self, ValidationError> {
        let raw_source = raw_source.into();
        if raw_source.trim().is_empty() {
            return Err(ValidationError::EmptyPattern);
        }

        let expression = if is_delimited(&raw_source) {
            strip_delimiters(&raw_source).to_string()
        } else {
            format!("^(?:{raw_source})$")
        };

        let matcher = Regex::new(&expression).map_err(|e| ValidationError::InvalidPattern {
            source_text: raw_source.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            raw_source,
            matcher,
            handler,
        })
    }

    /// Creates a step pattern whose handler does nothing.
    ///
    /// # Errors
    ///
    /// Same as [`StepPattern::new`].
    pub fn unbound(raw_source: impl Into<String>) -> Result<Self, ValidationError> {
        Self::new(raw_source, |_: &[CaptureArgument]| -> HandlerResult { Ok(()) })
    }

    /// The source as declared.
    #[must_use]
    pub fn raw_source(&self) -> &str {
        &self.raw_source
    }

    /// The compiled matcher.
    #[must_use]
    pub fn matcher(&self) -> &Regex {
        &self.matcher
    }

    /// Number of capture groups, excluding the whole match.
    #[must_use]
    pub fn capture_count(&self) -> usize {
        self.matcher.captures_len().saturating_sub(1)
    }

    /// Matches `text` natively and returns its captures, or `None` if it does not match.
    ///
    /// Groups that did not participate in the match yield an empty value with no offset.
    #[must_use]
    pub fn arguments_from(&self, text: &str) -> Option<Vec<CaptureArgument>> {
        let caps = self.matcher.captures(text)?;
        let args = (1..caps.len())
            .map(|i| match caps.get(i) {
                Some(m) => CaptureArgument::new(m.as_str(), i, m.start()),
                None => CaptureArgument::detached(String::new(), i),
            })
            .collect();
        Some(args)
    }

    /// Returns true if `text` matches this pattern natively.
    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        self.matcher.is_match(text)
    }

    /// Invokes the handler.
    ///
    /// # Errors
    ///
    /// Returns whatever failure message the handler reports.
    pub fn invoke(&self, args: &[CaptureArgument]) -> HandlerResult {
        self.handler.call(args)
    }
}

impl fmt::Debug for StepPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepPattern")
            .field("raw_source", &self.raw_source)
            .field("capture_count", &self.capture_count())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for StepPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw_source)
    }
}

/// Returns true if `text` is wrapped in `/…/`.
#[must_use]
pub fn is_delimited(text: &str) -> bool {
    text.len() >= 2 && text.starts_with(DELIMITER) && text.ends_with(DELIMITER)
}

/// Removes one leading and one trailing delimiter, each independently.
#[must_use]
pub fn strip_delimiters(text: &str) -> &str {
    let text = text.strip_prefix(DELIMITER).unwrap_or(text);
    text.strip_suffix(DELIMITER).unwrap_or(text)
}

/// Wraps `text` in delimiters.
#[must_use]
pub fn wrap_delimiters(text: &str) -> String {
    format!("{DELIMITER}{text}{DELIMITER}")
}

/// Removes a leading `^` and a trailing unescaped `$`.
#[must_use]
pub fn strip_anchors(body: &str) -> &str {
    let body = body.strip_prefix('^').unwrap_or(body);
    match body.strip_suffix('$') {
        Some(rest) if !ends_with_escape(rest) => rest,
        _ => body,
    }
}

/// True if `text` ends in an odd number of backslashes.
fn ends_with_escape(text: &str) -> bool {
    text.bytes().rev().take_while(|&b| b == b'\\').count() % 2 == 1
}
