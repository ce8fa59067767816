//! Mapping a scroll position to the window of rows worth rendering.
//!
//! Rows have a fixed pixel height, so the visible window is a pure function of
//! `(total_lines, viewport_lines, line_height, scroll_top)`; see
//! [`visible_range`]. [`VirtualScrollIndex`] wraps that function with the
//! settings of one list and remembers only the last range it computed.

use crate::error::DiffError;
use serde::{Deserialize, Serialize};

/// Row height in pixels when none is given.
pub const DEFAULT_LINE_HEIGHT: f64 = 20.0;

/// The rows to render and where to place them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibleRange {
    /// First visible row (0-indexed, inclusive).
    pub start_index: usize,

    /// One past the last visible row.
    pub end_index: usize,

    /// Pixel offset of `start_index` from the top of the list.
    pub offset_y: f64,

    /// Pixel height of the whole virtual list.
    pub total_height: f64,
}

impl VisibleRange {
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.end_index - self.start_index
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start_index == self.end_index
    }
}

/// Placement of one rendered row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualItem {
    pub index: usize,
    pub offset_y: f64,
    pub height: f64,
}

/// Computes the visible window for a scroll position.
///
/// The start row is `floor(scroll_top / line_height)` clamped so the window
/// never runs past the end of the list; negative or non-finite scroll
/// positions count as 0.
#[must_use]
pub fn visible_range(
    total_lines: usize,
    viewport_lines: usize,
    line_height: f64,
    scroll_top: f64,
) -> VisibleRange {
    let max_start = total_lines.saturating_sub(viewport_lines);
    let start_index = first_row(scroll_top, line_height).min(max_start);
    let end_index = start_index.saturating_add(viewport_lines).min(total_lines);

    VisibleRange {
        start_index,
        end_index,
        offset_y: start_index as f64 * line_height,
        total_height: total_lines as f64 * line_height,
    }
}

/// Rows needed to fill a viewport `height_px` tall, counting a partial row.
#[must_use]
pub fn viewport_lines_for_height(height_px: f64, line_height: f64) -> usize {
    if !height_px.is_finite() || height_px <= 0.0 {
        return 0;
    }
    // Float-to-int `as` saturates.
    (height_px / line_height).ceil() as usize
}

#[inline]
fn first_row(scroll_top: f64, line_height: f64) -> usize {
    if !scroll_top.is_finite() || scroll_top <= 0.0 {
        return 0;
    }
    (scroll_top / line_height).floor() as usize
}

fn check_line_height(line_height: f64) -> Result<(), DiffError> {
    if line_height.is_finite() && line_height > 0.0 {
        Ok(())
    } else {
        Err(DiffError::invalid_options(format!(
            "lineHeight must be a positive number, got {line_height}"
        )))
    }
}

/// Virtual scrolling state for one list of fixed-height rows.
#[derive(Debug, Clone)]
pub struct VirtualScrollIndex {
    total_lines: usize,
    viewport_lines: usize,
    line_height: f64,
    scroll_top: f64,
    range: VisibleRange,
}

impl VirtualScrollIndex {
    /// An index scrolled to the top, using [`DEFAULT_LINE_HEIGHT`].
    #[must_use]
    pub fn new(total_lines: usize, viewport_lines: usize) -> Self {
        Self {
            total_lines,
            viewport_lines,
            line_height: DEFAULT_LINE_HEIGHT,
            scroll_top: 0.0,
            range: visible_range(total_lines, viewport_lines, DEFAULT_LINE_HEIGHT, 0.0),
        }
    }

    pub fn with_line_height(
        total_lines: usize,
        viewport_lines: usize,
        line_height: f64,
    ) -> Result<Self, DiffError> {
        check_line_height(line_height)?;
        let mut index = Self::new(total_lines, viewport_lines);
        index.line_height = line_height;
        index.recompute();
        Ok(index)
    }

    #[inline]
    #[must_use]
    pub fn total_lines(&self) -> usize {
        self.total_lines
    }

    #[inline]
    #[must_use]
    pub fn line_height(&self) -> f64 {
        self.line_height
    }

    /// Recomputes the window for a new scroll position and viewport size.
    pub fn update_viewport(&mut self, scroll_top: f64, viewport_lines: usize) -> VisibleRange {
        self.scroll_top = scroll_top;
        self.viewport_lines = viewport_lines;
        self.recompute();
        self.range
    }

    /// The range from the last update.
    #[inline]
    #[must_use]
    pub fn visible_range(&self) -> VisibleRange {
        self.range
    }

    /// Changes the row count (e.g. a new diff result), keeping the scroll position.
    pub fn set_total_lines(&mut self, total_lines: usize) -> VisibleRange {
        self.total_lines = total_lines;
        self.recompute();
        self.range
    }

    pub fn set_line_height(&mut self, line_height: f64) -> Result<VisibleRange, DiffError> {
        check_line_height(line_height)?;
        self.line_height = line_height;
        self.recompute();
        Ok(self.range)
    }

    /// Largest meaningful `scroll_top`: the last row sits at the viewport bottom.
    #[must_use]
    pub fn max_scroll_top(&self) -> f64 {
        self.total_lines.saturating_sub(self.viewport_lines) as f64 * self.line_height
    }

    /// Scroll position that brings `line_index` to the top of the viewport,
    /// clamped to [`Self::max_scroll_top`].
    #[must_use]
    pub fn scroll_to_line(&self, line_index: usize) -> f64 {
        (line_index as f64 * self.line_height).min(self.max_scroll_top())
    }

    /// Row under pixel offset `position`, clamped to the last row.
    #[must_use]
    pub fn line_at_position(&self, position: f64) -> usize {
        first_row(position, self.line_height).min(self.total_lines.saturating_sub(1))
    }

    /// Placement of every row in the current range.
    #[must_use]
    pub fn visible_items(&self) -> Vec<VirtualItem> {
        (self.range.start_index..self.range.end_index)
            .map(|index| VirtualItem {
                index,
                offset_y: index as f64 * self.line_height,
                height: self.line_height,
            })
            .collect()
    }

    /// Share of all rows currently visible; 1 for an empty list.
    #[must_use]
    pub fn visible_fraction(&self) -> f64 {
        if self.total_lines == 0 {
            return 1.0;
        }
        self.range.len() as f64 / self.total_lines as f64
    }

    fn recompute(&mut self) {
        self.range = visible_range(
            self.total_lines,
            self.viewport_lines,
            self.line_height,
            self.scroll_top,
        );
    }
}
