//! Selection model for the editing grid.
//!
//! Coordinates are in view space: `row` indexes the visible (filtered,
//! sorted) row order and `col` indexes the visible columns. Bounds are the
//! caller's responsibility.

use serde::{Deserialize, Serialize};

use crate::fill::FillRange;

/// A cell coordinate in view space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coord {
    pub row: usize,
    pub col: usize,
}

impl Coord {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// A rectangular range of cells, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start_row: usize,
    pub start_col: usize,
    pub end_row: usize,
    pub end_col: usize,
}

impl Range {
    /// Create a new range, automatically normalizing so start <= end.
    pub fn new(r1: usize, c1: usize, r2: usize, c2: usize) -> Self {
        Self {
            start_row: r1.min(r2),
            start_col: c1.min(c2),
            end_row: r1.max(r2),
            end_col: c1.max(c2),
        }
    }

    /// Create a single-cell range.
    pub fn single(row: usize, col: usize) -> Self {
        Self {
            start_row: row,
            start_col: col,
            end_row: row,
            end_col: col,
        }
    }

    /// Range spanned by two corners, in any order.
    pub fn spanning(a: Coord, b: Coord) -> Self {
        Self::new(a.row, a.col, b.row, b.col)
    }

    /// Check if this range contains a cell.
    pub fn contains(&self, row: usize, col: usize) -> bool {
        row >= self.start_row && row <= self.end_row &&
        col >= self.start_col && col <= self.end_col
    }

    /// Number of rows covered.
    pub fn height(&self) -> usize {
        self.end_row - self.start_row + 1
    }

    /// Number of columns covered.
    pub fn width(&self) -> usize {
        self.end_col - self.start_col + 1
    }

    /// Number of cells in this range.
    pub fn cell_count(&self) -> usize {
        self.height() * self.width()
    }

    /// Iterate over all cells in this range (row-major order).
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> {
        let start_col = self.start_col;
        let end_col = self.end_col;

        (self.start_row..=self.end_row).flat_map(move |r| {
            (start_col..=end_col).map(move |c| (r, c))
        })
    }

    /// Check if this is a single cell.
    pub fn is_single(&self) -> bool {
        self.start_row == self.end_row && self.start_col == self.end_col
    }

    /// Top-left corner.
    pub fn start(&self) -> Coord {
        Coord::new(self.start_row, self.start_col)
    }

    /// Bottom-right corner (where the fill handle sits).
    pub fn end(&self) -> Coord {
        Coord::new(self.end_row, self.end_col)
    }
}

/// Direction for modifier+arrow "select to edge".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

/// Which pointer gesture is in progress. Selecting and Filling never overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gesture {
    #[default]
    Idle,
    Selecting,
    Filling,
}

/// Immutable view of the selection state after a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SelectionSnapshot {
    pub anchor: Option<Coord>,
    pub current: Option<Coord>,
    pub range: Option<Range>,
    pub gesture: Gesture,
    pub fill_end: Option<Coord>,
}

impl SelectionSnapshot {
    pub fn is_selected(&self, row: usize, col: usize) -> bool {
        self.range.map_or(false, |r| r.contains(row, col))
    }

    /// True for cells between the selection's bottom edge and the fill target.
    pub fn in_fill_area(&self, row: usize, col: usize) -> bool {
        match (self.range, self.fill_end) {
            (Some(range), Some(end)) => {
                row > range.end_row && row <= end.row &&
                col >= range.start_col && col <= range.end_col
            }
            _ => false,
        }
    }
}

/// Anchor/current selection with the fill-handle gesture layered on top.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    anchor: Option<Coord>,
    current: Option<Coord>,
    gesture: Gesture,
    fill_end: Option<Coord>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalized rectangle spanned by anchor and current.
    pub fn range(&self) -> Option<Range> {
        match (self.anchor, self.current) {
            (Some(a), Some(c)) => Some(Range::spanning(a, c)),
            _ => None,
        }
    }

    pub fn anchor(&self) -> Option<Coord> {
        self.anchor
    }

    pub fn current(&self) -> Option<Coord> {
        self.current
    }

    pub fn gesture(&self) -> Gesture {
        self.gesture
    }

    pub fn is_selecting(&self) -> bool {
        self.gesture == Gesture::Selecting
    }

    pub fn is_filling(&self) -> bool {
        self.gesture == Gesture::Filling
    }

    pub fn fill_end(&self) -> Option<Coord> {
        self.fill_end
    }

    /// Check if a cell is selected.
    pub fn is_selected(&self, row: usize, col: usize) -> bool {
        self.range().map_or(false, |r| r.contains(row, col))
    }

    pub fn snapshot(&self) -> SelectionSnapshot {
        SelectionSnapshot {
            anchor: self.anchor,
            current: self.current,
            range: self.range(),
            gesture: self.gesture,
            fill_end: self.fill_end,
        }
    }

    /// Press on a cell: anchor and current both move there.
    pub fn mouse_down(&mut self, row: usize, col: usize) -> SelectionSnapshot {
        let at = Coord::new(row, col);
        self.anchor = Some(at);
        self.current = Some(at);
        self.gesture = Gesture::Selecting;
        self.snapshot()
    }

    /// Pointer entered a cell. Only drags the selection while Selecting.
    pub fn mouse_enter(&mut self, row: usize, col: usize) -> SelectionSnapshot {
        if self.gesture == Gesture::Selecting {
            self.current = Some(Coord::new(row, col));
        }
        self.snapshot()
    }

    /// Global release. Ends either gesture; a fill whose target moved below
    /// the source is returned for commit and the target is cleared.
    pub fn mouse_up(&mut self) -> Option<FillRange> {
        let was_filling = self.gesture == Gesture::Filling;
        self.gesture = Gesture::Idle;
        if !was_filling {
            return None;
        }
        let commit = self.fill_range();
        self.fill_end = None;
        commit
    }

    /// Press on the fill handle. Requires an existing selection.
    pub fn fill_handle_mouse_down(&mut self) -> SelectionSnapshot {
        if self.range().is_some() {
            self.gesture = Gesture::Filling;
            self.fill_end = None;
        }
        self.snapshot()
    }

    /// Pointer entered a cell while dragging the fill handle. Only rows
    /// strictly below the selection count; the column is pinned to the
    /// selection's right edge.
    pub fn fill_handle_mouse_enter(&mut self, row: usize, _col: usize) -> SelectionSnapshot {
        if self.gesture == Gesture::Filling {
            if let Some(range) = self.range() {
                if row > range.end_row {
                    self.fill_end = Some(Coord::new(row, range.end_col));
                }
            }
        }
        self.snapshot()
    }

    /// Current fill source and target, if a target has been recorded.
    pub fn fill_range(&self) -> Option<FillRange> {
        let range = self.range()?;
        let end = self.fill_end?;
        FillRange::new(range, end.row)
    }

    /// Modifier+arrow: snap `current` to the first/last row or column.
    pub fn extend_to_edge(&mut self, direction: Direction, max_rows: usize, max_cols: usize) -> SelectionSnapshot {
        if self.anchor.is_none() {
            return self.snapshot();
        }
        if let Some(current) = self.current.as_mut() {
            match direction {
                Direction::Up => current.row = 0,
                Direction::Down => current.row = max_rows.saturating_sub(1),
                Direction::Left => current.col = 0,
                Direction::Right => current.col = max_cols.saturating_sub(1),
            }
        }
        self.snapshot()
    }

    /// Drop anchor, current and any fill target.
    pub fn clear(&mut self) -> SelectionSnapshot {
        self.anchor = None;
        self.current = None;
        self.fill_end = None;
        self.gesture = Gesture::Idle;
        self.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_single() {
        let r = Range::single(5, 3);
        assert!(r.contains(5, 3));
        assert!(!r.contains(5, 4));
        assert!(r.is_single());
        assert_eq!(r.cell_count(), 1);
    }

    #[test]
    fn test_range_multi() {
        let r = Range::new(1, 1, 3, 2);
        assert!(r.contains(1, 1));
        assert!(r.contains(2, 2));
        assert!(r.contains(3, 1));
        assert!(!r.contains(0, 0));
        assert!(!r.is_single());
        assert_eq!(r.cell_count(), 6); // 3 rows x 2 cols
    }

    #[test]
    fn test_range_normalizes() {
        let r = Range::new(5, 5, 1, 1);
        assert_eq!(r.start_row, 1);
        assert_eq!(r.start_col, 1);
        assert_eq!(r.end_row, 5);
        assert_eq!(r.end_col, 5);
    }

    #[test]
    fn test_drag_selects_rectangle() {
        let mut sel = Selection::new();
        sel.mouse_down(4, 5);
        sel.mouse_enter(2, 2);
        let snap = sel.mouse_enter(3, 1);

        assert_eq!(snap.range, Some(Range::new(3, 1, 4, 5)));
        assert!(sel.is_selected(4, 5));
        assert!(sel.is_selected(3, 1));
        assert!(!sel.is_selected(2, 2));
    }

    #[test]
    fn test_mouse_enter_ignored_when_idle() {
        let mut sel = Selection::new();
        sel.mouse_down(1, 1);
        assert!(sel.mouse_up().is_none());
        sel.mouse_enter(6, 6);
        assert_eq!(sel.range(), Some(Range::single(1, 1)));
    }

    #[test]
    fn test_extend_to_edge() {
        let mut sel = Selection::new();
        sel.mouse_down(3, 2);
        sel.mouse_up();

        sel.extend_to_edge(Direction::Down, 10, 12);
        assert_eq!(sel.range(), Some(Range::new(3, 2, 9, 2)));
        sel.extend_to_edge(Direction::Right, 10, 12);
        assert_eq!(sel.range(), Some(Range::new(3, 2, 9, 11)));
        sel.extend_to_edge(Direction::Up, 10, 12);
        assert_eq!(sel.anchor(), Some(Coord::new(3, 2)));
        assert_eq!(sel.range(), Some(Range::new(0, 2, 3, 11)));
    }

    #[test]
    fn test_extend_without_selection_is_noop() {
        let mut sel = Selection::new();
        let snap = sel.extend_to_edge(Direction::Down, 10, 10);
        assert_eq!(snap.range, None);
    }

    #[test]
    fn test_fill_only_extends_down() {
        let mut sel = Selection::new();
        sel.mouse_down(2, 1);
        sel.mouse_enter(3, 2);
        sel.mouse_up();

        sel.fill_handle_mouse_down();
        assert!(sel.is_filling());
        sel.fill_handle_mouse_enter(1, 0);
        assert_eq!(sel.fill_end(), None);
        sel.fill_handle_mouse_enter(3, 2);
        assert_eq!(sel.fill_end(), None);
        let snap = sel.fill_handle_mouse_enter(6, 0);
        assert_eq!(snap.fill_end, Some(Coord::new(6, 2)));
        assert!(snap.in_fill_area(5, 1));
        assert!(!snap.in_fill_area(5, 0));
        assert!(!snap.in_fill_area(3, 1));
    }

    #[test]
    fn test_filling_suppresses_selection_drag() {
        let mut sel = Selection::new();
        sel.mouse_down(0, 0);
        sel.mouse_up();
        sel.fill_handle_mouse_down();
        sel.mouse_enter(5, 3);
        assert_eq!(sel.range(), Some(Range::single(0, 0)));
    }

    #[test]
    fn test_fill_commit_on_release() {
        let mut sel = Selection::new();
        sel.mouse_down(0, 0);
        sel.mouse_enter(1, 1);
        sel.mouse_up();
        sel.fill_handle_mouse_down();
        sel.fill_handle_mouse_enter(4, 1);

        let fill = sel.mouse_up().expect("fill should commit");
        assert_eq!(fill.source, Range::new(0, 0, 1, 1));
        assert_eq!(fill.target_end, Coord::new(4, 1));
        assert_eq!(sel.fill_end(), None);
        assert_eq!(sel.gesture(), Gesture::Idle);
    }

    #[test]
    fn test_trivial_fill_drag_commits_nothing() {
        let mut sel = Selection::new();
        sel.mouse_down(0, 0);
        sel.mouse_up();
        sel.fill_handle_mouse_down();
        assert!(sel.mouse_up().is_none());
    }

    #[test]
    fn test_fill_handle_requires_selection() {
        let mut sel = Selection::new();
        let snap = sel.fill_handle_mouse_down();
        assert_eq!(snap.gesture, Gesture::Idle);
    }

    #[test]
    fn test_clear() {
        let mut sel = Selection::new();
        sel.mouse_down(1, 1);
        let snap = sel.clear();
        assert_eq!(snap, SelectionSnapshot::default());
    }
}
