//! Row view layer: filtering, ordering, virtualization and presentation
//!
//! This module maps between:
//! - View space (what the user sees: filtered and ordered rows)
//! - Data space (the snapshot's record list, index 0..N-1)
//!
//! Key invariants:
//! - Selection coordinates are view-space visible indices
//! - Store requests address records by id, resolved through data space
//! - visible_mask is indexed by DATA row (not view row)
//! - Empty rows are never hidden by a filter

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::dates::find_day_first_date;
use crate::record::{FieldValue, Record};
use crate::schema::{RecordKind, Schema, STATUS_OPTIONS};

// =============================================================================
// ViewFilters: global search + per-column any-of lists
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewFilters {
    /// Case-insensitive substring matched against every field.
    pub global: String,
    /// Field name -> accepted substrings (row passes if any matches).
    pub columns: BTreeMap<String, Vec<String>>,
}

impl ViewFilters {
    pub fn set_global(&mut self, text: impl Into<String>) {
        self.global = text.into();
    }

    pub fn set_column(&mut self, field: impl Into<String>, values: Vec<String>) {
        let field = field.into();
        if values.is_empty() {
            self.columns.remove(&field);
        } else {
            self.columns.insert(field, values);
        }
    }

    pub fn clear(&mut self) {
        self.global.clear();
        self.columns.clear();
    }

    pub fn is_active(&self) -> bool {
        !self.global.is_empty() || self.columns.values().any(|v| !v.is_empty())
    }

    /// Filter predicate for a non-empty row.
    pub fn matches(&self, record: &Record) -> bool {
        if !self.global.is_empty() {
            let needle = self.global.to_lowercase();
            let hit = record
                .fields
                .values()
                .any(|v| v.display().to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }

        self.columns.iter().all(|(field, wanted)| {
            if wanted.is_empty() {
                return true;
            }
            let text = record.get(field).display();
            wanted.iter().any(|w| text.contains(w.as_str()))
        })
    }
}

/// Distinct display values of a column over non-empty rows, with counts,
/// most frequent first. Feeds a column's filter menu.
pub fn column_values(records: &[Record], schema: &Schema, field: &str) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for r in records.iter().filter(|r| !r.is_empty(schema)) {
        let text = r.get(field).display();
        if !text.is_empty() {
            *counts.entry(text).or_default() += 1;
        }
    }
    let mut out: Vec<(String, usize)> = counts.into_iter().collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    out
}

// =============================================================================
// RowView: the core view layer mapping
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct RowView {
    /// Maps view_row index -> data_row index
    row_order: Vec<usize>,

    /// Visibility mask indexed by DATA row
    visible_mask: Vec<bool>,

    /// Data rows of the visible view rows, in view order.
    /// This is what the grid renders and what selection indexes.
    visible_data_rows: Vec<usize>,

    total_non_empty: usize,
    visible_non_empty: usize,
}

impl RowView {
    /// Filter then order a snapshot.
    pub fn build(records: &[Record], schema: &Schema, filters: &ViewFilters) -> Self {
        let empty: Vec<bool> = records.iter().map(|r| r.is_empty(schema)).collect();

        let visible_mask: Vec<bool> = records
            .iter()
            .zip(&empty)
            .map(|(r, &is_empty)| is_empty || filters.matches(r))
            .collect();

        let mut row_order: Vec<usize> = (0..records.len()).collect();
        row_order.sort_by(|&a, &b| compare_rows(schema, &records[a], empty[a], &records[b], empty[b]));

        let mut view = Self {
            row_order,
            visible_mask,
            visible_data_rows: Vec::new(),
            total_non_empty: empty.iter().filter(|e| !**e).count(),
            visible_non_empty: 0,
        };
        view.rebuild_visible_cache();
        view.visible_non_empty = view.visible_data_rows.iter().filter(|&&d| !empty[d]).count();
        view
    }

    /// Total number of rows (data rows)
    pub fn row_count(&self) -> usize {
        self.row_order.len()
    }

    /// Number of visible rows
    pub fn visible_count(&self) -> usize {
        self.visible_data_rows.len()
    }

    /// Visible position of a data row, or None if it is filtered out
    pub fn data_to_visible(&self, data_row: usize) -> Option<usize> {
        if !self.is_data_row_visible(data_row) {
            return None;
        }
        self.visible_data_rows.iter().position(|&d| d == data_row)
    }

    pub fn is_data_row_visible(&self, data_row: usize) -> bool {
        data_row < self.visible_mask.len() && self.visible_mask[data_row]
    }

    /// Data row shown at a visible index
    pub fn data_row_at(&self, visible_index: usize) -> Option<usize> {
        self.visible_data_rows.get(visible_index).copied()
    }

    pub fn visible_data_rows(&self) -> &[usize] {
        &self.visible_data_rows
    }

    pub fn is_filtered(&self) -> bool {
        self.visible_count() < self.row_count()
    }

    /// Non-empty rows in the snapshot
    pub fn total_non_empty(&self) -> usize {
        self.total_non_empty
    }

    /// Non-empty rows that pass the filters
    pub fn visible_non_empty(&self) -> usize {
        self.visible_non_empty
    }

    fn rebuild_visible_cache(&mut self) {
        self.visible_data_rows = self
            .row_order
            .iter()
            .copied()
            .filter(|&d| d < self.visible_mask.len() && self.visible_mask[d])
            .collect();
    }
}

/// Maintenance: non-empty rows first, then ascending id (stored before
/// pending). Contacts: manual order, then id.
fn compare_rows(schema: &Schema, a: &Record, a_empty: bool, b: &Record, b_empty: bool) -> Ordering {
    match schema.kind() {
        RecordKind::Maintenance => a_empty.cmp(&b_empty).then_with(|| a.id.cmp(&b.id)),
        RecordKind::Contact => {
            let order = |r: &Record| {
                schema
                    .order_field()
                    .and_then(|f| r.get(f.name).as_integer())
                    .unwrap_or(i64::MAX)
            };
            order(a).cmp(&order(b)).then_with(|| a.id.cmp(&b.id))
        }
    }
}

// =============================================================================
// Virtualization
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub scroll_offset: f32,
    pub height: f32,
}

/// Rows to materialize plus the spacer heights around them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibleWindow {
    pub start: usize,
    pub end: usize,
    pub padding_top: f32,
    pub padding_bottom: f32,
}

impl VisibleWindow {
    pub fn rows(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }
}

pub fn visible_window(row_count: usize, viewport: Viewport, row_height: f32, overscan: usize) -> VisibleWindow {
    if row_count == 0 || row_height <= 0.0 {
        return VisibleWindow { start: 0, end: 0, padding_top: 0.0, padding_bottom: 0.0 };
    }
    let scroll = viewport.scroll_offset.max(0.0);
    let first = ((scroll / row_height).floor() as usize).min(row_count);
    let last = (((scroll + viewport.height.max(0.0)) / row_height).ceil() as usize).min(row_count);

    let start = first.saturating_sub(overscan);
    let end = (last + overscan).min(row_count);
    VisibleWindow {
        start,
        end,
        padding_top: start as f32 * row_height,
        padding_bottom: (row_count - end) as f32 * row_height,
    }
}

// =============================================================================
// Grouping and presentation hints
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupPosition {
    Single,
    Start,
    Middle,
    End,
}

fn same_group(a: &Record, b: &Record) -> bool {
    let entries_match = match (a.get("entree"), b.get("entree")) {
        (FieldValue::DateTime(x), FieldValue::DateTime(y)) => x == y,
        _ => false,
    };
    a.get("engin") == b.get("engin")
        && a.get("site") == b.get("site")
        && (a.get("semaine") == b.get("semaine") || entries_match)
}

/// Group position of each row in display order. Empty rows never group.
pub fn group_positions(rows: &[&Record], schema: &Schema) -> Vec<GroupPosition> {
    if schema.kind() != RecordKind::Maintenance {
        return vec![GroupPosition::Single; rows.len()];
    }
    let empty: Vec<bool> = rows.iter().map(|r| r.is_empty(schema)).collect();
    let linked = |i: usize, j: usize| !empty[i] && !empty[j] && same_group(rows[i], rows[j]);

    (0..rows.len())
        .map(|i| {
            let prev = i > 0 && linked(i - 1, i);
            let next = i + 1 < rows.len() && linked(i, i + 1);
            match (prev, next) {
                (false, false) => GroupPosition::Single,
                (false, true) => GroupPosition::Start,
                (true, true) => GroupPosition::Middle,
                (true, false) => GroupPosition::End,
            }
        })
        .collect()
}

/// Row colouring by appointment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowTone {
    Plain,
    Validated,
    PreOp,
    Waiting,
    Refused,
}

pub fn row_tone(record: &Record) -> RowTone {
    let Some(status) = record.get("validationRdv").as_text() else {
        return RowTone::Plain;
    };
    match STATUS_OPTIONS.iter().position(|opt| *opt == status) {
        Some(0) => RowTone::Validated,
        Some(1) => RowTone::PreOp,
        Some(2) => RowTone::Waiting,
        Some(3) => RowTone::Refused,
        _ => RowTone::Plain,
    }
}

/// Highlight for the deadline ("butée") column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButeeHint {
    /// Contains a DD/MM/YYYY date before today.
    Overdue,
    /// Deadline expressed in kilometres.
    Mileage,
}

pub fn butee_hint(value: &FieldValue, today: NaiveDate) -> Option<ButeeHint> {
    let text = value.as_text()?;
    if find_day_first_date(text).is_some_and(|d| d < today) {
        return Some(ButeeHint::Overdue);
    }
    text.to_lowercase().contains("kms").then_some(ButeeHint::Mileage)
}
