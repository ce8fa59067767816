//! Line alignment using Myers' O((N+M)·D) difference algorithm.
//!
//! This is the linear-space variant: each step looks for the middle snake of
//! the remaining edit graph and splits the problem around it. Sub-problems are
//! kept on an explicit work stack instead of recursing, so a large edit
//! distance cannot exhaust the thread stack (diffs run on pool workers).
//!
//! Lines are interned to integer ids up front so every comparison in the hot
//! loop is a `u32` compare on the *normalized* text. The emitted [`ChangeOp`]s
//! carry the *raw* text.
//!
//! Ordering is deterministic: within a run of changes, all deletions are
//! emitted before all insertions.

use crate::diff::ChangeOp;
use crate::error::DiffError;
use crate::tokenizer::LineToken;
use std::collections::HashMap;
use std::ops::{Index, IndexMut, Range};

/// One contiguous span of the edit script, in 0-based line indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edit {
    Equal { old: usize, new: usize, len: usize },
    Delete { old: usize, len: usize },
    Insert { new: usize, len: usize },
}

/// Furthest-reaching x per diagonal `k`, addressable with negative `k`.
struct V {
    offset: isize,
    v: Vec<usize>,
}

impl V {
    fn new(max_d: usize) -> Self {
        Self {
            offset: max_d as isize,
            v: vec![0; 2 * max_d],
        }
    }
}

impl Index<isize> for V {
    type Output = usize;

    #[inline]
    fn index(&self, k: isize) -> &usize {
        &self.v[(k + self.offset) as usize]
    }
}

impl IndexMut<isize> for V {
    #[inline]
    fn index_mut(&mut self, k: isize) -> &mut usize {
        &mut self.v[(k + self.offset) as usize]
    }
}

/// Bound on the `d` loop of the middle-snake search: ceil((N+M)/2) + 1.
#[inline]
fn max_d(n: usize, m: usize) -> usize {
    (n + m + 1) / 2 + 1
}

/// Pending work for the alignment loop.
enum Task {
    Align(Range<usize>, Range<usize>),
    Equal { old: usize, new: usize, len: usize },
}

/// Computes the line-level edit script between `old` and `new`.
///
/// Projecting the result onto the old side (Equal + Delete) reproduces `old`
/// in order, and onto the new side (Equal + Insert) reproduces `new`.
pub fn diff(old: &[LineToken<'_>], new: &[LineToken<'_>]) -> Result<Vec<ChangeOp>, DiffError> {
    if old.is_empty() && new.is_empty() {
        return Ok(Vec::new());
    }

    let (old_ids, new_ids) = intern(old, new);
    let edits = align(&old_ids, &new_ids);
    materialize(&edits, old, new)
}

/// Maps each distinct normalized line to a small integer id.
fn intern<'a>(old: &'a [LineToken<'a>], new: &'a [LineToken<'a>]) -> (Vec<u32>, Vec<u32>) {
    let mut ids: HashMap<&'a str, u32> = HashMap::with_capacity(old.len() + new.len());
    let mut id_of = |token: &'a LineToken<'a>| -> u32 {
        let next = ids.len() as u32;
        *ids.entry(token.normalized.as_ref()).or_insert(next)
    };

    let old_ids = old.iter().map(&mut id_of).collect();
    let new_ids = new.iter().map(&mut id_of).collect();
    (old_ids, new_ids)
}

fn align(old: &[u32], new: &[u32]) -> Vec<Edit> {
    let max_d = max_d(old.len(), new.len());
    let mut vf = V::new(max_d);
    let mut vb = V::new(max_d);
    let mut script = Script::default();
    let mut stack = vec![Task::Align(0..old.len(), 0..new.len())];

    while let Some(task) = stack.pop() {
        let (mut old_range, mut new_range) = match task {
            Task::Equal { old, new, len } => {
                script.equal(old, new, len);
                continue;
            }
            Task::Align(old_range, new_range) => (old_range, new_range),
        };

        let prefix = common_prefix_len(&old[old_range.clone()], &new[new_range.clone()]);
        if prefix > 0 {
            script.equal(old_range.start, new_range.start, prefix);
        }
        old_range.start += prefix;
        new_range.start += prefix;

        let suffix = common_suffix_len(&old[old_range.clone()], &new[new_range.clone()]);
        old_range.end -= suffix;
        new_range.end -= suffix;
        if suffix > 0 {
            // Popped after everything pushed below.
            stack.push(Task::Equal {
                old: old_range.end,
                new: new_range.end,
                len: suffix,
            });
        }

        if old_range.is_empty() && new_range.is_empty() {
            continue;
        }
        if new_range.is_empty() {
            script.delete(old_range.start, old_range.len());
            continue;
        }
        if old_range.is_empty() {
            script.insert(new_range.start, new_range.len());
            continue;
        }

        match find_middle_snake(&old[old_range.clone()], &new[new_range.clone()], &mut vf, &mut vb) {
            Some((x, y)) => {
                let (x, y) = (old_range.start + x, new_range.start + y);
                stack.push(Task::Align(x..old_range.end, y..new_range.end));
                stack.push(Task::Align(old_range.start..x, new_range.start..y));
            }
            None => {
                script.delete(old_range.start, old_range.len());
                script.insert(new_range.start, new_range.len());
            }
        }
    }

    script.edits
}

/// Finds the start of the middle snake of `old` × `new`, relative to the
/// slices. Both slices must be non-empty.
fn find_middle_snake(old: &[u32], new: &[u32], vf: &mut V, vb: &mut V) -> Option<(usize, usize)> {
    let n = old.len();
    let m = new.len();
    let delta = n as isize - m as isize;
    let odd = delta & 1 == 1;

    vf[1] = 0;
    vb[1] = 0;

    let d_max = max_d(n, m) as isize;
    for d in 0..d_max {
        for k in (-d..=d).rev().step_by(2) {
            let mut x = if k == -d || (k != d && vf[k - 1] < vf[k + 1]) {
                vf[k + 1]
            } else {
                vf[k - 1] + 1
            };
            let y = (x as isize - k) as usize;
            let (x0, y0) = (x, y);
            if x < n && y < m {
                x += common_prefix_len(&old[x..], &new[y..]);
            }
            vf[k] = x;

            if odd && (k - delta).abs() <= d - 1 && vf[k] + vb[-(k - delta)] >= n {
                return Some((x0, y0));
            }
        }

        for k in (-d..=d).rev().step_by(2) {
            let mut x = if k == -d || (k != d && vb[k - 1] < vb[k + 1]) {
                vb[k + 1]
            } else {
                vb[k - 1] + 1
            };
            let mut y = (x as isize - k) as usize;
            if x < n && y < m {
                let advance = common_suffix_len(&old[..n - x], &new[..m - y]);
                x += advance;
                y += advance;
            }
            vb[k] = x;

            if !odd && (k - delta).abs() <= d && vb[k] + vf[-(k - delta)] >= n {
                return Some((n - x, m - y));
            }
        }
    }

    None
}

#[inline]
fn common_prefix_len(a: &[u32], b: &[u32]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

#[inline]
fn common_suffix_len(a: &[u32], b: &[u32]) -> usize {
    a.iter()
        .rev()
        .zip(b.iter().rev())
        .take_while(|(x, y)| x == y)
        .count()
}

/// Accumulates edits, coalescing adjacent spans of the same kind.
#[derive(Default)]
struct Script {
    edits: Vec<Edit>,
}

impl Script {
    fn equal(&mut self, old: usize, new: usize, len: usize) {
        if let Some(Edit::Equal { len: last, .. }) = self.edits.last_mut() {
            *last += len;
            return;
        }
        self.edits.push(Edit::Equal { old, new, len });
    }

    fn delete(&mut self, old: usize, len: usize) {
        if let Some(Edit::Delete { len: last, .. }) = self.edits.last_mut() {
            *last += len;
            return;
        }
        self.edits.push(Edit::Delete { old, len });
    }

    fn insert(&mut self, new: usize, len: usize) {
        if let Some(Edit::Insert { len: last, .. }) = self.edits.last_mut() {
            *last += len;
            return;
        }
        self.edits.push(Edit::Insert { new, len });
    }
}

/// Expands the span script into per-line ops, putting each run's deletions
/// ahead of its insertions and checking the walk covers both sides exactly.
fn materialize(
    edits: &[Edit],
    old: &[LineToken<'_>],
    new: &[LineToken<'_>],
) -> Result<Vec<ChangeOp>, DiffError> {
    let mut ops = Vec::with_capacity(old.len().max(new.len()));
    let mut old_pos = 0;
    let mut new_pos = 0;

    let mut i = 0;
    while i < edits.len() {
        if let Edit::Equal { old: o, new: n, len } = edits[i] {
            if o != old_pos || n != new_pos || o + len > old.len() || n + len > new.len() {
                return Err(misaligned(old_pos, new_pos));
            }
            ops.extend((0..len).map(|j| ChangeOp::equal(&old[o + j], &new[n + j])));
            old_pos += len;
            new_pos += len;
            i += 1;
            continue;
        }

        let run_end = edits[i..]
            .iter()
            .position(|e| matches!(e, Edit::Equal { .. }))
            .map_or(edits.len(), |p| i + p);
        let run = &edits[i..run_end];

        for edit in run {
            if let Edit::Delete { old: o, len } = *edit {
                if o != old_pos || o + len > old.len() {
                    return Err(misaligned(old_pos, new_pos));
                }
                ops.extend(old[o..o + len].iter().map(ChangeOp::delete));
                old_pos += len;
            }
        }
        for edit in run {
            if let Edit::Insert { new: n, len } = *edit {
                if n != new_pos || n + len > new.len() {
                    return Err(misaligned(old_pos, new_pos));
                }
                ops.extend(new[n..n + len].iter().map(ChangeOp::insert));
                new_pos += len;
            }
        }
        i = run_end;
    }

    if old_pos != old.len() || new_pos != new.len() {
        return Err(DiffError::ComputationFailure(format!(
            "edit script covers {old_pos}/{} old and {new_pos}/{} new lines",
            old.len(),
            new.len()
        )));
    }

    Ok(ops)
}

fn misaligned(old_pos: usize, new_pos: usize) -> DiffError {
    DiffError::ComputationFailure(format!(
        "edit script out of order at old line {old_pos}, new line {new_pos}"
    ))
}
