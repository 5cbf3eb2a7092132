//! Fill handle geometry.
//!
//! The selected block tiles downward cyclically: target row `t` copies
//! source row `start + ((t - start) mod height)`.

use serde::{Deserialize, Serialize};

use crate::selection::{Coord, Range};

/// Source rectangle plus a target end strictly below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillRange {
    pub source: Range,
    /// Column is always the source's right edge.
    pub target_end: Coord,
}

/// One target row and the source row it copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillStep {
    pub target_row: usize,
    pub source_row: usize,
}

impl FillRange {
    /// Returns `None` unless `target_end_row` is below the source.
    pub fn new(source: Range, target_end_row: usize) -> Option<Self> {
        if target_end_row <= source.end_row {
            return None;
        }
        Some(Self {
            source,
            target_end: Coord::new(target_end_row, source.end_col),
        })
    }

    /// Rows receiving copies.
    pub fn target_rows(&self) -> std::ops::RangeInclusive<usize> {
        (self.source.end_row + 1)..=self.target_end.row
    }

    /// The rectangle being written, excluding the source.
    pub fn target_range(&self) -> Range {
        Range::new(
            self.source.end_row + 1,
            self.source.start_col,
            self.target_end.row,
            self.source.end_col,
        )
    }

    pub fn source_row_for(&self, target_row: usize) -> usize {
        let start = self.source.start_row;
        start + (target_row - start) % self.source.height()
    }

    pub fn plan(&self) -> Vec<FillStep> {
        self.target_rows()
            .map(|target_row| FillStep {
                target_row,
                source_row: self.source_row_for(target_row),
            })
            .collect()
    }

    /// Source columns copied into every target row.
    pub fn columns(&self) -> std::ops::RangeInclusive<usize> {
        self.source.start_col..=self.source.end_col
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_row_source_tiles_cyclically() {
        let fill = FillRange::new(Range::new(0, 0, 1, 2), 6).unwrap();
        let sources: Vec<usize> = fill.plan().iter().map(|s| s.source_row).collect();
        assert_eq!(sources, vec![0, 1, 0, 1, 0]);
        assert_eq!(fill.target_range(), Range::new(2, 0, 6, 2));
    }

    #[test]
    fn offset_source_keeps_phase() {
        let fill = FillRange::new(Range::new(3, 1, 5, 1), 10).unwrap();
        let sources: Vec<usize> = fill.plan().iter().map(|s| s.source_row).collect();
        assert_eq!(sources, vec![3, 4, 5, 3, 4]);
    }

    #[test]
    fn target_must_be_below_source() {
        assert!(FillRange::new(Range::new(2, 0, 4, 0), 4).is_none());
        assert!(FillRange::new(Range::new(2, 0, 4, 0), 1).is_none());
    }

    #[test]
    fn target_column_pinned_to_right_edge() {
        let fill = FillRange::new(Range::new(0, 2, 0, 5), 3).unwrap();
        assert_eq!(fill.target_end, Coord::new(3, 5));
        assert_eq!(fill.columns(), 2..=5);
    }
}
