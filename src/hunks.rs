//! Grouping an edit script into contextual hunks.
//!
//! A hunk is a window over the op sequence: a cluster of changes plus up to
//! `context_lines` unchanged ops on each side. Clusters whose separating gap
//! of unchanged ops is shorter than `2 * context_lines` are merged, so hunks
//! never overlap and always come out in ascending line order.

use crate::diff::ChangeOp;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::ops::Range;

pub const DEFAULT_CONTEXT_LINES: usize = 3;

/// Most diffs have a handful of change runs; inline storage avoids heap allocation.
type Runs = SmallVec<[Range<usize>; 8]>;

/// A contiguous window of the diff with its line ranges on both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hunk {
    /// 1-based first old line, or the preceding line number when the hunk
    /// has no old lines (0 at the top of the file).
    pub old_start: usize,
    pub old_line_count: usize,

    /// Same convention as `old_start`, for the new side.
    pub new_start: usize,
    pub new_line_count: usize,

    /// `@@ -old_start,old_line_count +new_start,new_line_count @@`
    pub header: String,

    pub changes: Vec<ChangeOp>,
}

impl Hunk {
    /// Builds a hunk over `changes`, given how many lines of each side precede it.
    fn new(changes: Vec<ChangeOp>, old_before: usize, new_before: usize) -> Self {
        let old_line_count = changes.iter().filter(|c| c.on_old_side()).count();
        let new_line_count = changes.iter().filter(|c| c.on_new_side()).count();
        let old_start = old_before + usize::from(old_line_count > 0);
        let new_start = new_before + usize::from(new_line_count > 0);

        Self {
            old_start,
            old_line_count,
            new_start,
            new_line_count,
            header: header(old_start, old_line_count, new_start, new_line_count),
            changes,
        }
    }

    /// Fraction of ops in this hunk that are not Equal, for heatmaps.
    ///
    /// Derived from `changes` on every call so it cannot drift from them.
    #[must_use]
    pub fn change_intensity(&self) -> f64 {
        if self.changes.is_empty() {
            return 0.0;
        }
        let changed = self.changes.iter().filter(|c| c.is_change()).count();
        changed as f64 / self.changes.len() as f64
    }
}

#[inline]
#[must_use]
pub fn header(old_start: usize, old_count: usize, new_start: usize, new_count: usize) -> String {
    format!("@@ -{old_start},{old_count} +{new_start},{new_count} @@")
}

/// Groups `ops` into hunks with `context_lines` of surrounding context.
///
/// A script without changes yields no hunks.
#[must_use]
pub fn build_hunks(ops: &[ChangeOp], context_lines: usize) -> Vec<Hunk> {
    let runs = change_runs(ops);
    let mut hunks = Vec::with_capacity(runs.len());
    let mut lines = LineCursor::default();

    let mut groups = runs.into_iter();
    if let Some(first) = groups.next() {
        let mut current = first;
        for run in groups {
            if run.start - current.end < 2 * context_lines {
                current.end = run.end;
            } else {
                hunks.push(window(ops, &current, context_lines, &mut lines));
                current = run;
            }
        }
        hunks.push(window(ops, &current, context_lines, &mut lines));
    }

    // Guard against dropping visible changes if grouping ever comes up empty.
    if hunks.is_empty() && ops.iter().any(ChangeOp::is_change) {
        hunks.push(whole_document(ops));
    }

    hunks
}

/// Maximal ranges of consecutive non-Equal ops.
fn change_runs(ops: &[ChangeOp]) -> Runs {
    let mut runs = Runs::new();
    let mut start = None;

    for (i, op) in ops.iter().enumerate() {
        match (op.is_change(), start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                runs.push(s..i);
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push(s..ops.len());
    }

    runs
}

/// Running count of old/new lines consumed before an op index.
///
/// Windows are requested in ascending order, so the whole pass is linear.
#[derive(Default)]
struct LineCursor {
    pos: usize,
    old: usize,
    new: usize,
}

impl LineCursor {
    fn advance_to(&mut self, ops: &[ChangeOp], target: usize) -> (usize, usize) {
        for op in &ops[self.pos..target] {
            self.old += usize::from(op.on_old_side());
            self.new += usize::from(op.on_new_side());
        }
        self.pos = target;
        (self.old, self.new)
    }
}

/// Cuts the hunk for a merged change group, widening it by `context` ops on
/// each side within the document bounds.
fn window(ops: &[ChangeOp], group: &Range<usize>, context: usize, lines: &mut LineCursor) -> Hunk {
    let start = group.start.saturating_sub(context);
    let end = (group.end + context).min(ops.len());
    let (old_before, new_before) = lines.advance_to(ops, start);
    Hunk::new(ops[start..end].to_vec(), old_before, new_before)
}

fn whole_document(ops: &[ChangeOp]) -> Hunk {
    Hunk::new(ops.to_vec(), 0, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::ChangeKind;
    use crate::myers;
    use crate::tokenizer::{Normalization, tokenize};
    use test_case::test_case;

    fn ops(old: &str, new: &str) -> Vec<ChangeOp> {
        let old = tokenize(old, Normalization::default());
        let new = tokenize(new, Normalization::default());
        myers::diff(&old, &new).unwrap()
    }

    fn lines(range: Range<usize>) -> Vec<String> {
        range.map(|i| format!("line {i}")).collect()
    }

    /// 30 lines with line `at` replaced for each entry of `changed`.
    fn with_changes(changed: &[usize]) -> (String, String) {
        let old = lines(0..30);
        let mut new = old.clone();
        for &at in changed {
            new[at] = format!("changed {at}");
        }
        (old.join("\n"), new.join("\n"))
    }

    #[test]
    fn no_changes_no_hunks() {
        let script = ops("a\nb", "a\nb");
        assert!(build_hunks(&script, 3).is_empty());
        assert!(build_hunks(&[], 3).is_empty());
    }

    #[test]
    fn context_is_truncated_at_document_edges() {
        let (old, new) = with_changes(&[1]);
        let hunks = build_hunks(&ops(&old, &new), 3);
        assert_eq!(hunks.len(), 1);
        let hunk = &hunks[0];
        // one leading line (line 0), the change pair, three trailing lines
        assert_eq!(hunk.changes.len(), 6);
        assert_eq!(hunk.header, "@@ -1,5 +1,5 @@");
    }

    #[test]
    fn hunk_in_the_middle_has_full_context() {
        let (old, new) = with_changes(&[10]);
        let hunks = build_hunks(&ops(&old, &new), 3);
        assert_eq!(hunks.len(), 1);
        assert_eq!(hunks[0].old_start, 8);
        assert_eq!(hunks[0].old_line_count, 7);
        assert_eq!(hunks[0].new_start, 8);
        assert_eq!(hunks[0].new_line_count, 7);
        assert_eq!(hunks[0].changes.first().unwrap().content, "line 7");
        assert_eq!(hunks[0].changes.last().unwrap().content, "line 13");
    }

    // Gaps are counted in unchanged lines between the two changed lines.
    #[test_case(&[10, 13], 1; "gap of 2 merges")]
    #[test_case(&[10, 16], 1; "gap of 5 merges")]
    #[test_case(&[10, 17], 2; "gap of 6 splits")]
    #[test_case(&[5, 20], 2; "far apart")]
    fn nearby_clusters_merge(changed: &[usize], expected: usize) {
        let (old, new) = with_changes(changed);
        assert_eq!(build_hunks(&ops(&old, &new), 3).len(), expected);
    }

    #[test]
    fn zero_context_keeps_only_changes() {
        let (old, new) = with_changes(&[4, 6]);
        let hunks = build_hunks(&ops(&old, &new), 0);
        assert_eq!(hunks.len(), 2);
        assert!(hunks.iter().all(|h| h.changes.iter().all(ChangeOp::is_change)));
        assert_eq!(hunks[1].header, "@@ -7,1 +7,1 @@");
    }

    #[test]
    fn pure_insertion_reports_preceding_old_line() {
        let hunks = build_hunks(&ops("a\nb", "a\nx\nb"), 0);
        assert_eq!(hunks.len(), 1);
        assert_eq!(hunks[0].header, "@@ -1,0 +2,1 @@");
    }

    #[test]
    fn pure_deletion_at_top() {
        let hunks = build_hunks(&ops("x\na", "a"), 0);
        assert_eq!(hunks[0].header, "@@ -1,1 +0,0 @@");
    }

    #[test]
    fn every_change_lands_in_exactly_one_hunk() {
        let old = lines(0..60).join("\n");
        let mut new_lines = lines(0..60);
        new_lines.remove(50);
        new_lines.insert(30, "inserted".to_string());
        new_lines[2] = "edited".to_string();
        new_lines.push("tail".to_string());
        let script = ops(&old, &new_lines.join("\n"));

        for context in 0..5 {
            let hunks = build_hunks(&script, context);
            let in_hunks: usize = hunks
                .iter()
                .map(|h| h.changes.iter().filter(|c| c.is_change()).count())
                .sum();
            let total = script.iter().filter(|c| c.is_change()).count();
            assert_eq!(in_hunks, total, "context {context}");

            for pair in hunks.windows(2) {
                assert!(pair[0].old_start + pair[0].old_line_count <= pair[1].old_start);
                assert!(pair[0].new_start + pair[0].new_line_count <= pair[1].new_start);
            }
        }
    }

    #[test]
    fn change_intensity_is_fraction_of_changes() {
        let hunks = build_hunks(&ops("a\nb\nc", "a\nx\nc"), 3);
        assert_eq!(hunks[0].change_intensity(), 0.5);

        let all_new = build_hunks(&ops("", "x\ny"), 3);
        assert_eq!(all_new[0].change_intensity(), 1.0);
    }

    #[test]
    fn change_runs_are_maximal() {
        let script = ops("a\nb\nc\nd", "x\nb\ny\nz");
        let runs = change_runs(&script);
        let kinds: Vec<Vec<ChangeKind>> = runs
            .iter()
            .map(|r| script[r.clone()].iter().map(|c| c.kind).collect())
            .collect();
        assert_eq!(
            kinds,
            vec![
                vec![ChangeKind::Delete, ChangeKind::Insert],
                vec![
                    ChangeKind::Delete,
                    ChangeKind::Delete,
                    ChangeKind::Insert,
                    ChangeKind::Insert
                ],
            ]
        );
    }

    #[test]
    fn whole_document_fallback_spans_everything() {
        let script = ops("a\nb", "a\nc");
        let hunk = whole_document(&script);
        assert_eq!(hunk.changes, script);
        assert_eq!(hunk.header, "@@ -1,2 +1,2 @@");
    }
}
