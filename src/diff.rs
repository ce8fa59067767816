//! Options, result types, and the single-shot diff entry point.
//!
//! [`compute_diff`] runs the full pipeline:
//!
//! 1. Validate [`DiffOptions`] and refuse oversize inputs
//! 2. Tokenize both texts ([`crate::tokenizer`])
//! 3. Align the token sequences ([`crate::myers`])
//! 4. Group the edit script into hunks ([`crate::hunks`])
//! 5. Derive [`DiffStats`] from the script and the hunks
//!
//! The serialized form of [`DiffResult`] is the contract the rendering and
//! export layers read, so field names and nesting are fixed:
//!
//! ```json
//! {
//!   "hunks": [{
//!     "oldStart": 1, "oldLineCount": 3, "newStart": 1, "newLineCount": 3,
//!     "header": "@@ -1,3 +1,3 @@",
//!     "changes": [{"type": "delete", "content": "b", "lineNumber": {"old": 2}}]
//!   }],
//!   "stats": {"additions": 1, "deletions": 1, "modifications": 1,
//!             "similarity": 0.667, "hunks": 1, "changeIntensity": [0.5]},
//!   "isLargeFile": false
//! }
//! ```

use crate::error::{DiffError, Side};
use crate::hunks::{self, Hunk};
use crate::myers;
use crate::streaming::StreamingProcessor;
use crate::tokenizer::{self, LineToken, Normalization};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Largest accepted `contextLines`.
pub const MAX_CONTEXT_LINES: usize = 10_000;

/// Default refusal threshold for a single input: 10 MiB.
pub const DEFAULT_MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

/// Default size above which a result is flagged `isLargeFile`: 1 MiB.
pub const DEFAULT_CHUNK_THRESHOLD: usize = 1024 * 1024;

/// Alignment strategy.
///
/// Only Myers is implemented. The other variants are accepted option values
/// that fail with [`DiffError::AlgorithmNotImplemented`] instead of quietly
/// running Myers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    #[default]
    Myers,
    Patience,
    Histogram,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Algorithm::Myers => "myers",
            Algorithm::Patience => "patience",
            Algorithm::Histogram => "histogram",
        })
    }
}

/// Options recognized by every diff entry point.
///
/// Deserializes from camelCase keys (the JSON/JS convention) and also accepts
/// snake_case aliases for Lua callers. Missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DiffOptions {
    pub algorithm: Algorithm,

    /// Unchanged lines kept on each side of a change.
    #[serde(alias = "context_lines")]
    pub context_lines: usize,

    /// Compare lines with surrounding whitespace trimmed.
    #[serde(alias = "ignore_whitespace")]
    pub ignore_whitespace: bool,

    #[serde(alias = "ignore_case")]
    pub ignore_case: bool,

    /// Byte size above which `compute_diff` refuses an input.
    #[serde(alias = "max_file_size")]
    pub max_file_size: usize,

    /// Byte size above which a result is flagged as a large file.
    #[serde(alias = "chunk_threshold")]
    pub chunk_threshold: usize,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Myers,
            context_lines: hunks::DEFAULT_CONTEXT_LINES,
            ignore_whitespace: false,
            ignore_case: false,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            chunk_threshold: DEFAULT_CHUNK_THRESHOLD,
        }
    }
}

impl DiffOptions {
    /// Parses and validates options from a JSON object.
    pub fn from_json(json: &str) -> Result<Self, DiffError> {
        let options: Self = serde_json::from_str(json)
            .map_err(|e| DiffError::invalid_options(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Checks ranges and that the selected algorithm is implemented.
    pub fn validate(&self) -> Result<(), DiffError> {
        if self.context_lines > MAX_CONTEXT_LINES {
            return Err(DiffError::invalid_options(format!(
                "contextLines must be at most {MAX_CONTEXT_LINES}, got {}",
                self.context_lines
            )));
        }
        if self.max_file_size == 0 {
            return Err(DiffError::invalid_options("maxFileSize must be positive"));
        }
        if self.chunk_threshold == 0 {
            return Err(DiffError::invalid_options("chunkThreshold must be positive"));
        }
        match self.algorithm {
            Algorithm::Myers => Ok(()),
            other => Err(DiffError::AlgorithmNotImplemented(other)),
        }
    }

    #[inline]
    #[must_use]
    pub fn normalization(&self) -> Normalization {
        Normalization {
            ignore_whitespace: self.ignore_whitespace,
            ignore_case: self.ignore_case,
        }
    }

    #[inline]
    fn is_large(&self, old_len: usize, new_len: usize) -> bool {
        old_len > self.chunk_threshold || new_len > self.chunk_threshold
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Equal,
    Insert,
    Delete,
}

/// 1-based line numbers of a change; the side a change does not touch is absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineNumber {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<usize>,
}

/// One atomic edit unit of the aligned walk over both inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeOp {
    #[serde(rename = "type")]
    pub kind: ChangeKind,

    /// Raw line text. Equal lines show the old side's text.
    pub content: String,

    pub line_number: LineNumber,
}

impl ChangeOp {
    pub(crate) fn equal(old: &LineToken<'_>, new: &LineToken<'_>) -> Self {
        Self {
            kind: ChangeKind::Equal,
            content: old.raw.to_owned(),
            line_number: LineNumber {
                old: Some(old.index + 1),
                new: Some(new.index + 1),
            },
        }
    }

    pub(crate) fn delete(old: &LineToken<'_>) -> Self {
        Self {
            kind: ChangeKind::Delete,
            content: old.raw.to_owned(),
            line_number: LineNumber {
                old: Some(old.index + 1),
                new: None,
            },
        }
    }

    pub(crate) fn insert(new: &LineToken<'_>) -> Self {
        Self {
            kind: ChangeKind::Insert,
            content: new.raw.to_owned(),
            line_number: LineNumber {
                old: None,
                new: Some(new.index + 1),
            },
        }
    }

    #[inline]
    #[must_use]
    pub fn is_change(&self) -> bool {
        self.kind != ChangeKind::Equal
    }

    /// Whether this op consumes a line of the old input.
    #[inline]
    #[must_use]
    pub fn on_old_side(&self) -> bool {
        self.kind != ChangeKind::Insert
    }

    /// Whether this op consumes a line of the new input.
    #[inline]
    #[must_use]
    pub fn on_new_side(&self) -> bool {
        self.kind != ChangeKind::Delete
    }
}

/// Aggregate figures over a whole diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffStats {
    pub additions: usize,
    pub deletions: usize,

    /// Deleted lines paired with an inserted line in the same change run.
    pub modifications: usize,

    /// 0..=1, where 1 means the inputs compare equal.
    pub similarity: f64,

    pub hunks: usize,

    /// Per-hunk fraction of non-equal ops, in hunk order.
    pub change_intensity: Vec<f64>,
}

impl DiffStats {
    /// Counters for a failed computation.
    #[must_use]
    pub fn zeroed() -> Self {
        Self {
            additions: 0,
            deletions: 0,
            modifications: 0,
            similarity: 0.0,
            hunks: 0,
            change_intensity: Vec::new(),
        }
    }

    fn compute(ops: &[ChangeOp], hunks: &[Hunk], old_len: usize, new_len: usize) -> Self {
        let mut additions = 0;
        let mut deletions = 0;
        let mut modifications = 0;
        let (mut run_inserts, mut run_deletes) = (0, 0);

        for op in ops {
            match op.kind {
                ChangeKind::Insert => {
                    additions += 1;
                    run_inserts += 1;
                }
                ChangeKind::Delete => {
                    deletions += 1;
                    run_deletes += 1;
                }
                ChangeKind::Equal => {
                    modifications += run_inserts.min(run_deletes);
                    (run_inserts, run_deletes) = (0, 0);
                }
            }
        }
        modifications += run_inserts.min(run_deletes);

        Self {
            additions,
            deletions,
            modifications,
            similarity: similarity(additions, deletions, old_len, new_len),
            hunks: hunks.len(),
            change_intensity: hunks.iter().map(Hunk::change_intensity).collect(),
        }
    }
}

/// `1 - (additions + deletions) / (old_len + new_len)`, or 1 for two empty inputs.
fn similarity(additions: usize, deletions: usize, old_len: usize, new_len: usize) -> f64 {
    let total = old_len + new_len;
    if total == 0 {
        return 1.0;
    }
    (1.0 - (additions + deletions) as f64 / total as f64).clamp(0.0, 1.0)
}

/// Output of one diff computation. Never mutated; streaming supersedes it with
/// a fresh value on every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResult {
    pub hunks: Vec<Hunk>,
    pub stats: DiffStats,

    /// Either input exceeded the chunk threshold.
    #[serde(default)]
    pub is_large_file: bool,

    /// Set when the computation failed; `hunks` is then empty and `stats` zeroed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DiffResult {
    /// The no-op diff of two empty inputs.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            hunks: Vec::new(),
            stats: DiffStats {
                similarity: 1.0,
                ..DiffStats::zeroed()
            },
            is_large_file: false,
            error: None,
        }
    }

    /// A degraded result carrying `error` instead of content.
    #[must_use]
    pub fn failed(error: impl Into<String>, is_large_file: bool) -> Self {
        Self {
            hunks: Vec::new(),
            stats: DiffStats::zeroed(),
            is_large_file,
            error: Some(error.into()),
        }
    }

    /// No hunks and no error.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty() && self.error.is_none()
    }

    /// Number of rows a renderer shows for this diff: every op of every hunk.
    #[must_use]
    pub fn rendered_rows(&self) -> usize {
        self.hunks.iter().map(|h| h.changes.len()).sum()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Single-shot diff of two texts.
///
/// Option and size problems fail fast with an error. An internal alignment
/// failure is returned as a well-formed result with `error` set.
pub fn compute_diff(
    old_text: &str,
    new_text: &str,
    options: &DiffOptions,
) -> Result<DiffResult, DiffError> {
    options.validate()?;
    check_size(Side::Old, old_text, options.max_file_size)?;
    check_size(Side::New, new_text, options.max_file_size)?;
    Ok(diff_texts(old_text, new_text, options))
}

fn check_size(side: Side, text: &str, limit: usize) -> Result<(), DiffError> {
    if text.len() > limit {
        warn!("refusing {side} input of {} bytes (limit {limit})", text.len());
        return Err(DiffError::SizeExceeded {
            side,
            size: text.len(),
            limit,
        });
    }
    Ok(())
}

/// The diff pipeline without option or size checks. Callers must have
/// validated `options`.
pub(crate) fn diff_texts(old_text: &str, new_text: &str, options: &DiffOptions) -> DiffResult {
    let started = Instant::now();
    let is_large_file = options.is_large(old_text.len(), new_text.len());
    let normalization = options.normalization();

    let old_tokens = tokenizer::tokenize(old_text, normalization);
    let new_tokens = tokenizer::tokenize(new_text, normalization);

    let ops = match myers::diff(&old_tokens, &new_tokens) {
        Ok(ops) => ops,
        Err(err) => {
            warn!("diff of {} x {} lines failed: {err}", old_tokens.len(), new_tokens.len());
            return DiffResult::failed(err.to_string(), is_large_file);
        }
    };

    let hunks = hunks::build_hunks(&ops, options.context_lines);
    let stats = DiffStats::compute(&ops, &hunks, old_tokens.len(), new_tokens.len());

    debug!(
        "diffed {} x {} lines into {} hunks (+{} -{}) in {:?}",
        old_tokens.len(),
        new_tokens.len(),
        stats.hunks,
        stats.additions,
        stats.deletions,
        started.elapsed()
    );

    DiffResult {
        hunks,
        stats,
        is_large_file,
        error: None,
    }
}

/// A reusable diff handle owning validated options.
#[derive(Debug, Clone, Default)]
pub struct DiffEngine {
    options: DiffOptions,
}

impl DiffEngine {
    pub fn new(options: DiffOptions) -> Result<Self, DiffError> {
        options.validate()?;
        Ok(Self { options })
    }

    #[inline]
    #[must_use]
    pub fn options(&self) -> &DiffOptions {
        &self.options
    }

    /// Replaces the options; on error the previous options stay in effect.
    pub fn set_options(&mut self, options: DiffOptions) -> Result<(), DiffError> {
        options.validate()?;
        self.options = options;
        Ok(())
    }

    pub fn compute(&self, old_text: &str, new_text: &str) -> Result<DiffResult, DiffError> {
        compute_diff(old_text, new_text, &self.options)
    }

    /// A fresh streaming session using this engine's options.
    #[must_use]
    pub fn streaming(&self) -> StreamingProcessor {
        StreamingProcessor::from_validated(self.options.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn diff(old: &str, new: &str) -> DiffResult {
        compute_diff(old, new, &DiffOptions::default()).unwrap()
    }

    fn kinds(hunk: &Hunk) -> Vec<(ChangeKind, &str)> {
        hunk.changes
            .iter()
            .map(|c| (c.kind, c.content.as_str()))
            .collect()
    }

    #[test]
    fn single_replacement_scenario() {
        let result = diff("a\nb\nc", "a\nx\nc");

        assert_eq!(result.hunks.len(), 1);
        let hunk = &result.hunks[0];
        assert_eq!(
            (hunk.old_start, hunk.old_line_count, hunk.new_start, hunk.new_line_count),
            (1, 3, 1, 3)
        );
        assert_eq!(hunk.header, "@@ -1,3 +1,3 @@");
        assert_eq!(
            kinds(hunk),
            vec![
                (ChangeKind::Equal, "a"),
                (ChangeKind::Delete, "b"),
                (ChangeKind::Insert, "x"),
                (ChangeKind::Equal, "c"),
            ]
        );
        assert_eq!(result.stats.additions, 1);
        assert_eq!(result.stats.deletions, 1);
        assert_eq!(result.stats.modifications, 1);
        assert!((result.stats.similarity - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(result.stats.change_intensity, vec![0.5]);
    }

    #[test]
    fn identity_has_no_hunks() {
        let text = "fn main() {\n    println!(\"hi\");\n}\n";
        let result = diff(text, text);
        assert!(result.hunks.is_empty());
        assert_eq!(result.stats.additions, 0);
        assert_eq!(result.stats.deletions, 0);
        assert_eq!(result.stats.similarity, 1.0);
        assert!(result.is_empty());
    }

    #[test]
    fn both_empty() {
        let result = diff("", "");
        assert!(result.hunks.is_empty());
        assert_eq!(result.stats.similarity, 1.0);
        assert_eq!(result, DiffResult::empty());
    }

    #[test]
    fn empty_old_is_one_insert_hunk() {
        let result = diff("", "x\ny");
        assert_eq!(result.hunks.len(), 1);
        assert_eq!(
            kinds(&result.hunks[0]),
            vec![(ChangeKind::Insert, "x"), (ChangeKind::Insert, "y")]
        );
        assert_eq!(result.hunks[0].header, "@@ -0,0 +1,2 @@");
        assert_eq!(result.stats.similarity, 0.0);
    }

    #[test]
    fn ignore_whitespace_treats_padding_as_equal() {
        let options = DiffOptions {
            ignore_whitespace: true,
            ..DiffOptions::default()
        };
        let result = compute_diff("  foo  ", "foo", &options).unwrap();
        assert!(result.hunks.is_empty());
        assert_eq!(result.stats.additions + result.stats.deletions, 0);
    }

    #[test]
    fn ignore_case_keeps_raw_content() {
        let options = DiffOptions {
            ignore_case: true,
            ..DiffOptions::default()
        };
        let result = compute_diff("Hello\nold", "HELLO\nnew", &options).unwrap();
        let hunk = &result.hunks[0];
        assert_eq!(hunk.changes[0].content, "Hello");
        assert_eq!(hunk.changes[2].content, "new");
    }

    #[test]
    fn additions_and_deletions_swap_when_inputs_swap() {
        let pairs = [
            ("a\nb\nc", "a\nc\nd\ne"),
            ("", "x"),
            ("one\ntwo\nthree\nfour", "zero\none\nthree"),
            ("same", "same"),
        ];
        for (a, b) in pairs {
            let forward = diff(a, b);
            let backward = diff(b, a);
            assert_eq!(forward.stats.additions, backward.stats.deletions);
            assert_eq!(forward.stats.deletions, backward.stats.additions);
        }
    }

    #[test]
    fn modifications_count_paired_runs() {
        let result = diff("a\nb\nc\nd", "a\nB\nC\nD\nE");
        assert_eq!(result.stats.deletions, 3);
        assert_eq!(result.stats.additions, 4);
        assert_eq!(result.stats.modifications, 3);
    }

    #[test]
    fn size_limit_fails_before_work() {
        let options = DiffOptions {
            max_file_size: 4,
            ..DiffOptions::default()
        };
        let err = compute_diff("abc", "abcdef", &options).unwrap_err();
        assert_eq!(
            err,
            DiffError::SizeExceeded {
                side: Side::New,
                size: 6,
                limit: 4
            }
        );
    }

    #[test]
    fn large_file_flag_follows_threshold() {
        let options = DiffOptions {
            chunk_threshold: 8,
            ..DiffOptions::default()
        };
        assert!(compute_diff("0123456789", "", &options).unwrap().is_large_file);
        assert!(!compute_diff("0123", "", &options).unwrap().is_large_file);
    }

    #[test_case(Algorithm::Patience)]
    #[test_case(Algorithm::Histogram)]
    fn unimplemented_algorithms_are_rejected(algorithm: Algorithm) {
        let options = DiffOptions {
            algorithm,
            ..DiffOptions::default()
        };
        assert_eq!(
            compute_diff("a", "b", &options).unwrap_err(),
            DiffError::AlgorithmNotImplemented(algorithm)
        );
    }

    #[test]
    fn out_of_range_context_is_invalid() {
        let options = DiffOptions {
            context_lines: MAX_CONTEXT_LINES + 1,
            ..DiffOptions::default()
        };
        assert!(matches!(
            compute_diff("a", "b", &options),
            Err(DiffError::InvalidOptions(_))
        ));
    }

    #[test]
    fn options_from_json_accept_both_spellings() {
        let camel = DiffOptions::from_json(r#"{"contextLines": 5, "ignoreCase": true}"#).unwrap();
        let snake = DiffOptions::from_json(r#"{"context_lines": 5, "ignore_case": true}"#).unwrap();
        assert_eq!(camel, snake);
        assert_eq!(camel.context_lines, 5);
        assert_eq!(camel.max_file_size, DEFAULT_MAX_FILE_SIZE);
    }

    #[test_case(r#"{"algorithm": "bogus"}"#; "unknown algorithm")]
    #[test_case(r#"{"contextLines": -1}"#; "negative context")]
    #[test_case(r#"{"maxFileSize": 0}"#; "zero size limit")]
    #[test_case("not json"; "malformed")]
    fn bad_json_options_are_invalid(json: &str) {
        assert!(matches!(
            DiffOptions::from_json(json),
            Err(DiffError::InvalidOptions(_))
        ));
    }

    #[test]
    fn json_shape_matches_contract() {
        let json = diff("a\nb\nc", "a\nx\nc").to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        let hunk = &value["hunks"][0];
        assert_eq!(hunk["oldStart"], 1);
        assert_eq!(hunk["oldLineCount"], 3);
        assert_eq!(hunk["newStart"], 1);
        assert_eq!(hunk["newLineCount"], 3);
        assert_eq!(hunk["header"], "@@ -1,3 +1,3 @@");

        let delete = &hunk["changes"][1];
        assert_eq!(delete["type"], "delete");
        assert_eq!(delete["content"], "b");
        assert_eq!(delete["lineNumber"]["old"], 2);
        assert!(delete["lineNumber"].get("new").is_none());

        let stats = &value["stats"];
        assert_eq!(stats["additions"], 1);
        assert_eq!(stats["deletions"], 1);
        assert_eq!(stats["hunks"], 1);
        assert_eq!(stats["changeIntensity"][0], 0.5);
        assert!(value.get("error").is_none());
    }

    #[test]
    fn failed_result_is_zeroed() {
        let result = DiffResult::failed("boom", true);
        assert!(result.hunks.is_empty());
        assert_eq!(result.stats, DiffStats::zeroed());
        assert_eq!(result.error.as_deref(), Some("boom"));

        let value: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
        assert_eq!(value["error"], "boom");
    }

    #[test]
    fn json_round_trips_through_serde() {
        let result = diff("a\nb", "b\nc");
        let back: DiffResult = serde_json::from_str(&result.to_json().unwrap()).unwrap();
        assert_eq!(back.hunks, result.hunks);
        assert_eq!(back.stats.additions, result.stats.additions);
        assert_eq!(back.is_large_file, result.is_large_file);
        assert_eq!(back.error, None);
    }

    #[test]
    fn rendered_rows_sum_hunk_changes() {
        let result = diff("a\nb\nc", "a\nx\nc");
        assert_eq!(result.rendered_rows(), 4);
    }

    #[test]
    fn engine_keeps_old_options_on_invalid_update() {
        let mut engine = DiffEngine::default();
        let bad = DiffOptions {
            algorithm: Algorithm::Histogram,
            ..DiffOptions::default()
        };
        assert!(engine.set_options(bad).is_err());
        assert_eq!(engine.options(), &DiffOptions::default());

        let good = DiffOptions {
            context_lines: 0,
            ..DiffOptions::default()
        };
        engine.set_options(good).unwrap();
        let result = engine.compute("a\nb\nc", "a\nx\nc").unwrap();
        assert_eq!(result.hunks[0].changes.len(), 2);
    }

    #[test]
    fn engine_streaming_inherits_options() {
        let engine = DiffEngine::new(DiffOptions {
            ignore_case: true,
            ..DiffOptions::default()
        })
        .unwrap();
        let mut stream = engine.streaming();
        stream.add_old_chunk("ABC").unwrap();
        stream.add_new_chunk("abc").unwrap();
        assert!(stream.finalize().unwrap().hunks.is_empty());
    }
}
