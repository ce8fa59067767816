//! Splitting raw text into comparable line tokens.
//!
//! Each [`LineToken`] keeps the exact line text for display and a
//! `normalized` form used only for comparison. Normalization borrows from the
//! input whenever no folding applies, so tokenizing with default options never
//! allocates per line.

use std::borrow::Cow;

/// Comparison folding applied to every line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Normalization {
    pub ignore_whitespace: bool,
    pub ignore_case: bool,
}

/// One logical line of an input text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineToken<'a> {
    /// 0-based position in the source text.
    pub index: usize,

    /// The line exactly as it appears in the input, without its `\n`.
    pub raw: &'a str,

    /// The comparison key after whitespace/case folding.
    pub normalized: Cow<'a, str>,
}

/// Tokenizes `text` into lines.
///
/// Empty text has no lines. Otherwise the text is split on `'\n'` like a plain
/// split, so a trailing newline yields one extra empty line.
#[must_use]
pub fn tokenize(text: &str, normalization: Normalization) -> Vec<LineToken<'_>> {
    if text.is_empty() {
        return Vec::new();
    }

    text.split('\n')
        .enumerate()
        .map(|(index, raw)| LineToken {
            index,
            raw,
            normalized: normalize(raw, normalization),
        })
        .collect()
}

/// Number of lines [`tokenize`] would produce, without building tokens.
#[inline]
#[must_use]
pub fn line_count(text: &str) -> usize {
    if text.is_empty() {
        0
    } else {
        count_newlines(text.as_bytes()) + 1
    }
}

#[inline]
fn count_newlines(bytes: &[u8]) -> usize {
    bytes.iter().filter(|&&b| b == b'\n').count()
}

fn normalize(raw: &str, normalization: Normalization) -> Cow<'_, str> {
    let trimmed = if normalization.ignore_whitespace {
        raw.trim()
    } else {
        raw
    };

    if normalization.ignore_case && trimmed.chars().any(changes_case) {
        Cow::Owned(trimmed.to_lowercase())
    } else {
        Cow::Borrowed(trimmed)
    }
}

#[inline]
fn changes_case(c: char) -> bool {
    c.to_lowercase().ne(std::iter::once(c))
}
