//! Narrow interface to a text matcher.
//!
//! The pattern language itself lives elsewhere; this crate only needs the
//! candidate matches a pattern finds in a piece of text. A [`Match`] carries
//! the byte span it covers and the text that should replace it when the
//! matcher is used for rewriting.

use std::ops::Range;

/// One candidate match inside a text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// Byte range in the searched text.
    pub span: Range<usize>,
    /// Text substituted for `span` by [`rewrite`].
    pub replacement: String,
}

impl Match {
    /// A match that rewrites `span` to `replacement`.
    pub fn new(span: Range<usize>, replacement: impl Into<String>) -> Self {
        Self {
            span,
            replacement: replacement.into(),
        }
    }

    /// A match that rewrites its span to itself.
    pub fn identity(text: &str, span: Range<usize>) -> Self {
        let replacement = text[span.clone()].to_string();
        Self { span, replacement }
    }
}

pub trait Matcher {
    /// Candidate matches in `text`, ordered by position. Empty means no
    /// match, which is never an error.
    fn attempt_matches(&self, text: &str) -> Vec<Match>;

    fn is_match(&self, text: &str) -> bool {
        !self.attempt_matches(text).is_empty()
    }
}

impl<F> Matcher for F
where
    F: Fn(&str) -> Vec<Match>,
{
    fn attempt_matches(&self, text: &str) -> Vec<Match> {
        self(text)
    }
}

/// Substring matcher. Without a replacement it rewrites each occurrence to
/// itself.
#[derive(Debug, Clone)]
pub struct Literal {
    needle: String,
    replacement: Option<String>,
}

impl Literal {
    pub fn new(needle: impl Into<String>) -> Self {
        Self {
            needle: needle.into(),
            replacement: None,
        }
    }

    pub fn replace_with(mut self, replacement: impl Into<String>) -> Self {
        self.replacement = Some(replacement.into());
        self
    }
}

impl Matcher for Literal {
    fn attempt_matches(&self, text: &str) -> Vec<Match> {
        // An empty needle would match between every character.
        if self.needle.is_empty() {
            return Vec::new();
        }
        text.match_indices(self.needle.as_str())
            .map(|(start, found)| {
                let span = start..start + found.len();
                match &self.replacement {
                    Some(r) => Match::new(span, r.clone()),
                    None => Match::identity(text, span),
                }
            })
            .collect()
    }
}

/// Apply `matcher`'s candidates to `text` left to right. Spans that overlap
/// an earlier accepted match are dropped, as are inverted spans and spans
/// that do not fall on char boundaries. Text outside every match passes
/// through unchanged.
pub fn rewrite<M: Matcher + ?Sized>(matcher: &M, text: &str) -> String {
    let mut matches = matcher.attempt_matches(text);
    matches.sort_by_key(|m| m.span.start);

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for m in matches {
        let Range { start, end } = m.span;
        if start < cursor
            || start > end
            || !text.is_char_boundary(start)
            || !text.is_char_boundary(end)
        {
            continue;
        }
        out.push_str(&text[cursor..start]);
        out.push_str(&m.replacement);
        cursor = end;
    }
    out.push_str(&text[cursor..]);
    out
}
