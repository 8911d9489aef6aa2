//! Argument synthesis.
//!
//! The oracle reports parameter values, but the host wants captures as if the
//! pattern had matched natively. The synthesizer rebuilds a step text the
//! pattern should accept by writing each value into its capture group, then
//! matches the pattern against that text. When the rebuilt text does not match
//! (a value the group cannot hold, a construct the rebuild cannot express) the
//! raw values are used instead. Synthesis never fails outward: a body it cannot
//! scan yields no arguments.

use crate::error::SynthesisError;
use crate::pattern::{strip_anchors, strip_delimiters, CaptureArgument, StepPattern};

/// How a set of arguments was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SynthesisOutcome {
    /// The oracle reported no parameter values.
    NoParameters,
    /// The rebuilt text matched the pattern; captures come from that match.
    Rematched,
    /// The rebuilt text did not match; raw values were used.
    RawFallback,
    /// The pattern body could not be scanned.
    Failed,
}

/// Arguments synthesized for a pattern chosen by the oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synthesis {
    /// Arguments to pass to the handler, at most one per capture group.
    pub arguments: Vec<CaptureArgument>,
    /// The rebuilt step text, when it matched the pattern.
    pub synthesized_text: Option<String>,
    /// How the arguments were produced.
    pub outcome: SynthesisOutcome,
}

impl Synthesis {
    fn empty(outcome: SynthesisOutcome) -> Self {
        Self {
            arguments: Vec::new(),
            synthesized_text: None,
            outcome,
        }
    }
}

/// Produces handler arguments for `pattern` from the oracle's parameter values.
///
/// Values map to capture groups by group number. Extra values are ignored and
/// groups without a value are left empty.
#[must_use]
pub fn synthesize<S: AsRef<str>>(pattern: &StepPattern, values: &[S]) -> Synthesis {
    if values.is_empty() {
        return Synthesis::empty(SynthesisOutcome::NoParameters);
    }

    let body = bare_body(pattern.raw_source());
    let text = match substitute_groups(body, values) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(
                pattern = %pattern.raw_source(),
                error = %e,
                "cannot rebuild step text from pattern, passing no arguments"
            );
            return Synthesis::empty(SynthesisOutcome::Failed);
        }
    };

    if let Some(arguments) = pattern.arguments_from(&text) {
        return Synthesis {
            arguments,
            synthesized_text: Some(text),
            outcome: SynthesisOutcome::Rematched,
        };
    }

    tracing::debug!(
        pattern = %pattern.raw_source(),
        rebuilt = %text,
        "rebuilt text does not match its pattern, using raw values"
    );
    let arguments = values
        .iter()
        .take(pattern.capture_count())
        .enumerate()
        .map(|(i, v)| CaptureArgument::detached(v.as_ref(), i + 1))
        .collect();
    Synthesis {
        arguments,
        synthesized_text: None,
        outcome: SynthesisOutcome::RawFallback,
    }
}

/// The pattern body with delimiters and anchors removed.
#[must_use]
pub fn bare_body(raw_source: &str) -> &str {
    strip_anchors(strip_delimiters(raw_source))
}

/// Rewrites `body` as literal text, replacing each capture group with its value.
///
/// Groups nested inside a replaced group are consumed with it. Only the first
/// branch of an alternation is written, and non-capturing groups are rebuilt in
/// place. Inline flags and other zero-width constructs vanish, quantifiers are
/// dropped, and character classes and shorthand escapes become one character
/// they accept.
///
/// # Errors
///
/// Returns `SynthesisError` if a group or character class is never closed, or
/// the body ends in a lone backslash.
pub fn substitute_groups<S: AsRef<str>>(body: &str, values: &[S]) -> Result<String, SynthesisError> {
    let chars: Vec<char> = body.chars().collect();
    let mut rebuild = Rebuild {
        chars: &chars,
        values,
        group: 0,
        out: String::with_capacity(body.len()),
    };
    rebuild.alternation(0, chars.len())?;
    Ok(rebuild.out)
}

struct Rebuild<'a, S> {
    chars: &'a [char],
    values: &'a [S],
    /// Capture groups seen so far, including skipped ones.
    group: usize,
    out: String,
}

impl<S: AsRef<str>> Rebuild<'_, S> {
    fn alternation(&mut self, start: usize, end: usize) -> Result<(), SynthesisError> {
        let split = alternative_end(self.chars, start, end)?;
        self.sequence(start, split)?;
        if split < end {
            self.group += count_capturing(&self.chars[split + 1..end]);
        }
        Ok(())
    }

    fn sequence(&mut self, start: usize, end: usize) -> Result<(), SynthesisError> {
        let chars = self.chars;
        let mut i = start;

        while i < end {
            match chars[i] {
                '\\' => {
                    let next = *chars.get(i + 1).ok_or(SynthesisError::TrailingEscape)?;
                    push_unescaped(&mut self.out, next);
                    i += 2;
                }
                '[' => {
                    let close = class_end(chars, i)?;
                    match class_member(&chars[i..=close]) {
                        Some(c) => self.out.push(c),
                        None => self.out.extend(&chars[i..=close]),
                    }
                    i = close + 1;
                }
                '(' => {
                    let close = group_end(chars, i)?;
                    match group_kind(chars, i) {
                        GroupKind::Capturing => {
                            self.group += 1;
                            if let Some(value) = self.values.get(self.group - 1) {
                                self.out.push_str(value.as_ref());
                            }
                            self.group += count_capturing(&chars[i + 1..close]);
                        }
                        GroupKind::NonCapturing { body } => self.alternation(body, close)?,
                        GroupKind::ZeroWidth => {}
                    }
                    i = close + 1;
                }
                '^' | '$' | '?' | '*' | '+' => i += 1,
                '{' => match brace_quantifier_end(chars, i) {
                    Some(close) => i = close + 1,
                    None => {
                        self.out.push('{');
                        i += 1;
                    }
                },
                c => {
                    self.out.push(c);
                    i += 1;
                }
            }
        }

        Ok(())
    }
}

fn push_unescaped(out: &mut String, c: char) {
    match c {
        's' | 'W' => out.push(' '),
        'd' => out.push('0'),
        'w' | 'D' | 'S' => out.push('a'),
        't' => out.push('\t'),
        'n' => out.push('\n'),
        // zero-width assertions
        'b' | 'B' | 'A' | 'z' => {}
        c if c.is_ascii_punctuation() => out.push(c),
        c => {
            out.push('\\');
            out.push(c);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupKind {
    Capturing,
    /// `(?:...)` or `(?flags:...)`; `body` indexes the first char inside.
    NonCapturing { body: usize },
    /// Flag-only groups and lookarounds.
    ZeroWidth,
}

fn group_kind(chars: &[char], start: usize) -> GroupKind {
    if chars.get(start + 1) != Some(&'?') {
        return GroupKind::Capturing;
    }
    match (chars.get(start + 2), chars.get(start + 3)) {
        (Some('P'), Some('<')) => return GroupKind::Capturing,
        (Some('<'), Some(c)) if *c != '=' && *c != '!' => return GroupKind::Capturing,
        (Some('=' | '!' | '<'), _) => return GroupKind::ZeroWidth,
        _ => {}
    }
    match chars[start + 2..].iter().position(|c| *c == ':' || *c == ')') {
        Some(p) if chars[start + 2 + p] == ':' => GroupKind::NonCapturing {
            body: start + 3 + p,
        },
        _ => GroupKind::ZeroWidth,
    }
}

/// Index of the first top-level `|` in `start..end`, or `end`.
fn alternative_end(chars: &[char], start: usize, end: usize) -> Result<usize, SynthesisError> {
    let mut j = start;
    while j < end {
        match chars[j] {
            '\\' => j += 2,
            '[' => j = class_end(chars, j)? + 1,
            '(' => j = group_end(chars, j)? + 1,
            '|' => return Ok(j),
            _ => j += 1,
        }
    }
    Ok(end)
}

#[derive(Debug, Clone, Copy)]
enum ClassItem {
    Range(char, char),
    Digit,
    Word,
    Space,
}

impl ClassItem {
    fn sample(self) -> char {
        match self {
            Self::Range(lo, _) => lo,
            Self::Digit => '0',
            Self::Word => 'a',
            Self::Space => ' ',
        }
    }

    fn contains(self, c: char) -> bool {
        match self {
            Self::Range(lo, hi) => (lo..=hi).contains(&c),
            Self::Digit => c.is_ascii_digit(),
            Self::Word => c.is_alphanumeric() || c == '_',
            Self::Space => c.is_whitespace(),
        }
    }
}

/// Candidates tried, in order, for a negated class.
const NEGATED_CLASS_SAMPLES: [char; 8] = ['a', 'x', 'Z', '0', ' ', '_', '-', '.'];

/// A character accepted by `class`, the full `[...]` text.
///
/// Returns `None` for classes too rich to sample (nested or POSIX classes,
/// negated shorthands, unicode properties).
fn class_member(class: &[char]) -> Option<char> {
    let end = class.len() - 1;
    let mut j = 1;
    let negated = class.get(j) == Some(&'^');
    if negated {
        j += 1;
    }

    let mut items = Vec::new();
    while j < end {
        let lo = match class[j] {
            '\\' => {
                let escaped = *class.get(j + 1)?;
                j += 2;
                match escaped {
                    'd' => {
                        items.push(ClassItem::Digit);
                        continue;
                    }
                    'w' => {
                        items.push(ClassItem::Word);
                        continue;
                    }
                    's' => {
                        items.push(ClassItem::Space);
                        continue;
                    }
                    'n' => '\n',
                    't' => '\t',
                    c if c.is_ascii_punctuation() => c,
                    _ => return None,
                }
            }
            '[' => return None,
            c => {
                j += 1;
                c
            }
        };

        if class.get(j) == Some(&'-') && j + 1 < end {
            let hi = class[j + 1];
            if hi == '\\' || hi == '[' {
                return None;
            }
            items.push(ClassItem::Range(lo, hi));
            j += 2;
        } else {
            items.push(ClassItem::Range(lo, lo));
        }
    }

    if negated {
        NEGATED_CLASS_SAMPLES
            .into_iter()
            .find(|c| !items.iter().any(|item| item.contains(*c)))
    } else {
        items.first().copied().map(ClassItem::sample)
    }
}

/// Index of the `)` closing the group opened at `start`.
fn group_end(chars: &[char], start: usize) -> Result<usize, SynthesisError> {
    let mut depth = 0usize;
    let mut j = start;
    while j < chars.len() {
        match chars[j] {
            '\\' => j += 1,
            '[' => j = class_end(chars, j)?,
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(j);
                }
            }
            _ => {}
        }
        j += 1;
    }
    Err(SynthesisError::UnbalancedGroup { position: start })
}

/// Index of the `]` closing the character class opened at `start`.
fn class_end(chars: &[char], start: usize) -> Result<usize, SynthesisError> {
    let mut j = start + 1;
    if chars.get(j) == Some(&'^') {
        j += 1;
    }
    // a leading `]` is literal
    if chars.get(j) == Some(&']') {
        j += 1;
    }
    let mut depth = 1usize;
    while j < chars.len() {
        match chars[j] {
            '\\' => j += 1,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(j);
                }
            }
            _ => {}
        }
        j += 1;
    }
    Err(SynthesisError::UnterminatedClass { position: start })
}

fn count_capturing(chars: &[char]) -> usize {
    let mut count = 0;
    let mut j = 0;
    while j < chars.len() {
        match chars[j] {
            '\\' => j += 1,
            '[' => match class_end(chars, j) {
                Ok(end) => j = end,
                Err(_) => break,
            },
            '(' if group_kind(chars, j) == GroupKind::Capturing => count += 1,
            _ => {}
        }
        j += 1;
    }
    count
}

/// Index of the `}` ending a `{n}`, `{n,}` or `{n,m}` quantifier at `start`.
fn brace_quantifier_end(chars: &[char], start: usize) -> Option<usize> {
    let close = chars[start..].iter().position(|c| *c == '}')? + start;
    let inner = &chars[start + 1..close];
    let valid = !inner.is_empty()
        && inner[0].is_ascii_digit()
        && inner.iter().all(|c| c.is_ascii_digit() || *c == ',')
        && inner.iter().filter(|c| **c == ',').count() <= 1;
    valid.then_some(close)
}
