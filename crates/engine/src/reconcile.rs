//! Batch reconciliation: turn cell edits into one bulk update and one bulk
//! delete.
//!
//! Edits are grouped per row (later edits to the same field win), each
//! value is normalized for its column, and the merged row is validated
//! before anything is dispatched. A row that becomes empty is deleted only
//! while the grid holds more empty rows than the floor; otherwise the blank
//! values are written as an ordinary update.

use std::collections::HashMap;

use crate::error::{GridError, NormalizeError};
use crate::normalize::normalize;
use crate::record::{count_empty, FieldMap, FieldValue, Record, RecordId, RowPatch};
use crate::schema::Schema;

/// A single cell assignment as produced by typing, paste, fill, or clear.
#[derive(Debug, Clone, PartialEq)]
pub struct CellEdit {
    pub id: RecordId,
    pub field: String,
    pub value: FieldValue,
}

impl CellEdit {
    pub fn new(id: RecordId, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self { id, field: field.into(), value: value.into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchPlan {
    /// Normalized changes for stored rows, in first-edit order.
    pub updates: Vec<(i64, FieldMap)>,
    pub deletes: Vec<i64>,
    /// Normalized changes addressed to rows still awaiting their create.
    pub deferred: Vec<RowPatch>,
    /// Cells dropped because their value could not be normalized.
    pub skipped: Vec<NormalizeError>,
}

impl BatchPlan {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.deletes.is_empty() && self.deferred.is_empty()
    }

    /// Every row this plan changes.
    pub fn touched(&self) -> Vec<RecordId> {
        self.updates
            .iter()
            .map(|(id, _)| RecordId::Stored(*id))
            .chain(self.deletes.iter().map(|id| RecordId::Stored(*id)))
            .chain(self.deferred.iter().map(|p| p.id))
            .collect()
    }
}

/// Outcome of a single-cell edit.
#[derive(Debug, Clone, PartialEq)]
pub enum CellPlan {
    Update(i64, FieldMap),
    Delete(i64),
    /// The row is pending; apply locally and send after its create.
    Deferred(RowPatch),
    /// Nothing to send (unknown row or unparseable value).
    Skip,
}

pub fn plan_batch(
    records: &[Record],
    schema: &Schema,
    edits: &[CellEdit],
    floor: usize,
) -> Result<BatchPlan, GridError> {
    let mut plan = BatchPlan::default();
    let by_id: HashMap<RecordId, &Record> = records.iter().map(|r| (r.id, r)).collect();

    // Group per row, keeping first-seen order
    let mut rows: Vec<(RecordId, FieldMap)> = Vec::new();
    let mut slot: HashMap<RecordId, usize> = HashMap::new();
    for edit in edits {
        if !by_id.contains_key(&edit.id) {
            log::debug!("edit for unknown row {} ignored", edit.id);
            continue;
        }
        let value = match normalize(schema, &edit.field, edit.value.clone()) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("row {}: {}; cell skipped", edit.id, e);
                plan.skipped.push(e);
                continue;
            }
        };
        let index = *slot.entry(edit.id).or_insert_with(|| {
            rows.push((edit.id, FieldMap::new()));
            rows.len() - 1
        });
        rows[index].1.insert(edit.field.clone(), value);
    }

    let mut emptied = Vec::new();
    for (id, fields) in rows {
        let Some(current) = by_id.get(&id) else { continue };
        let mut merged = (*current).clone();
        merged.apply(&fields);
        check_interval(schema, &merged)?;

        match id {
            RecordId::Pending(_) => plan.deferred.push(RowPatch { id, fields }),
            RecordId::Stored(stored) => {
                if merged.is_empty(schema) {
                    emptied.push((stored, fields));
                } else {
                    plan.updates.push((stored, fields));
                }
            }
        }
    }

    if count_empty(records, schema) > floor {
        plan.deletes = emptied.into_iter().map(|(id, _)| id).collect();
    } else {
        plan.updates.extend(emptied);
    }
    Ok(plan)
}

/// The single-cell path: same normalization, validation and empty-row rule.
pub fn plan_cell(
    records: &[Record],
    schema: &Schema,
    edit: &CellEdit,
    floor: usize,
) -> Result<CellPlan, GridError> {
    let mut plan = plan_batch(records, schema, std::slice::from_ref(edit), floor)?;
    if let Some(patch) = plan.deferred.pop() {
        return Ok(CellPlan::Deferred(patch));
    }
    if let Some(id) = plan.deletes.pop() {
        return Ok(CellPlan::Delete(id));
    }
    Ok(match plan.updates.pop() {
        Some((id, fields)) => CellPlan::Update(id, fields),
        None => CellPlan::Skip,
    })
}

/// Reject a row whose exit precedes its entry.
pub fn check_interval(schema: &Schema, record: &Record) -> Result<(), GridError> {
    let Some((start, end)) = schema.interval_fields() else {
        return Ok(());
    };
    match (record.get(start).as_datetime(), record.get(end).as_datetime()) {
        (Some(entry), Some(exit)) if exit < entry => Err(GridError::Validation {
            row: record.id,
            message: format!("{end} is before {start}"),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::blank_fields;
    use chrono::{TimeZone, Utc};

    fn rows(n: i64, filled: &[i64]) -> Vec<Record> {
        let schema = Schema::maintenance();
        (1..=n)
            .map(|id| {
                let mut r = Record::new(RecordId::Stored(id), Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
                r.apply(&blank_fields(&schema));
                if filled.contains(&id) {
                    r.set("flotte", format!("F{id}"));
                }
                r
            })
            .collect()
    }

    fn edit(id: i64, field: &str, value: &str) -> CellEdit {
        CellEdit::new(RecordId::Stored(id), field, value)
    }

    #[test]
    fn test_groups_edits_per_row() {
        let schema = Schema::maintenance();
        let records = rows(4, &[]);
        let plan = plan_batch(
            &records,
            &schema,
            &[edit(1, "flotte", "A"), edit(1, "engin", "B"), edit(2, "flotte", "C"), edit(2, "engin", "D")],
            5,
        )
        .unwrap();
        assert_eq!(plan.updates.len(), 2);
        assert_eq!(plan.updates[0].0, 1);
        assert_eq!(plan.updates[0].1.get("engin"), Some(&FieldValue::text("B")));
        assert!(plan.deletes.is_empty());
    }

    #[test]
    fn test_later_edit_wins() {
        let schema = Schema::maintenance();
        let records = rows(1, &[]);
        let plan = plan_batch(&records, &schema, &[edit(1, "flotte", "A"), edit(1, "flotte", "Z")], 5).unwrap();
        assert_eq!(plan.updates, vec![(1, [("flotte".to_string(), FieldValue::text("Z"))].into())]);
    }

    #[test]
    fn test_interval_violation_aborts_batch() {
        let schema = Schema::maintenance();
        let records = rows(2, &[]);
        let err = plan_batch(
            &records,
            &schema,
            &[
                edit(1, "flotte", "ok"),
                edit(2, "entree", "2024-01-10T09:00"),
                edit(2, "sortie", "2024-01-05T17:00"),
            ],
            5,
        )
        .unwrap_err();
        match err {
            GridError::Validation { row, .. } => assert_eq!(row, RecordId::Stored(2)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_bad_date_is_skipped_not_fatal() {
        let schema = Schema::maintenance();
        let records = rows(1, &[]);
        let plan = plan_batch(&records, &schema, &[edit(1, "entree", "soon"), edit(1, "flotte", "F")], 5).unwrap();
        assert_eq!(plan.skipped.len(), 1);
        assert_eq!(plan.updates.len(), 1);
        assert!(!plan.updates[0].1.contains_key("entree"));
    }

    #[test]
    fn test_emptied_rows_deleted_only_above_floor() {
        let schema = Schema::maintenance();

        // 6 empty + 2 filled: clearing row 7 deletes it
        let records = rows(8, &[7, 8]);
        let plan = plan_batch(&records, &schema, &[edit(7, "flotte", "")], 5).unwrap();
        assert_eq!(plan.deletes, vec![7]);
        assert!(plan.updates.is_empty());

        // 5 empty: clearing becomes an update
        let records = rows(7, &[6, 7]);
        let plan = plan_batch(&records, &schema, &[edit(7, "flotte", "")], 5).unwrap();
        assert!(plan.deletes.is_empty());
        assert_eq!(plan.updates, vec![(7, [("flotte".to_string(), FieldValue::text(""))].into())]);
    }

    #[test]
    fn test_pending_rows_are_deferred() {
        let schema = Schema::maintenance();
        let mut records = rows(1, &[]);
        let mut pending = records[0].clone();
        pending.id = RecordId::Pending(1);
        records.push(pending);

        let plan = plan_batch(
            &records,
            &schema,
            &[CellEdit::new(RecordId::Pending(1), "flotte", "X"), edit(1, "flotte", "Y")],
            5,
        )
        .unwrap();
        assert_eq!(plan.deferred.len(), 1);
        assert_eq!(plan.deferred[0].id, RecordId::Pending(1));
        assert_eq!(plan.updates.len(), 1);
    }

    #[test]
    fn test_plan_cell() {
        let schema = Schema::maintenance();
        let records = rows(8, &[7, 8]);
        assert_eq!(plan_cell(&records, &schema, &edit(7, "flotte", ""), 5).unwrap(), CellPlan::Delete(7));
        assert!(matches!(
            plan_cell(&records, &schema, &edit(8, "engin", "E"), 5).unwrap(),
            CellPlan::Update(8, _)
        ));
        assert_eq!(plan_cell(&records, &schema, &edit(99, "engin", "E"), 5).unwrap(), CellPlan::Skip);
    }
}
