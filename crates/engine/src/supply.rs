//! Row supply: keep a fixed number of blank rows at the bottom of the
//! maintenance grid for data entry.

use chrono::{DateTime, Duration, Utc};

use crate::record::Record;
use crate::schema::Schema;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupplyPlan {
    /// Exactly `floor` empty rows.
    Steady,
    /// Create this many blank rows.
    Create(usize),
    /// Delete these stored rows, oldest first.
    Delete(Vec<i64>),
    /// Too many empty rows, but none has outlived the grace window yet.
    TooYoung,
}

/// Decide how to bring the empty-row count back to `floor`.
///
/// Only stored rows older than `grace_ms` are deletion candidates, so a
/// row the user just added (or a paste is about to fill) survives.
pub fn plan_supply(
    records: &[Record],
    schema: &Schema,
    floor: usize,
    now: DateTime<Utc>,
    grace_ms: u64,
) -> SupplyPlan {
    let empty: Vec<&Record> = records.iter().filter(|r| r.is_empty(schema)).collect();

    if empty.len() < floor {
        return SupplyPlan::Create(floor - empty.len());
    }
    if empty.len() == floor {
        return SupplyPlan::Steady;
    }

    let excess = empty.len() - floor;
    let grace = Duration::milliseconds(grace_ms as i64);
    let mut old: Vec<(DateTime<Utc>, i64)> = empty
        .iter()
        .filter(|r| now - r.created_at > grace)
        .filter_map(|r| r.id.stored().map(|id| (r.created_at, id)))
        .collect();
    if old.is_empty() {
        return SupplyPlan::TooYoung;
    }
    old.sort();
    SupplyPlan::Delete(old.into_iter().take(excess).map(|(_, id)| id).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{blank_fields, RecordId};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap()
    }

    /// Empty rows created `ages_ms` before t0, plus `filled` non-empty rows.
    fn grid(ages_ms: &[i64], filled: usize) -> Vec<Record> {
        let schema = Schema::maintenance();
        let mut out = Vec::new();
        let mut id = 0;
        for age in ages_ms {
            id += 1;
            let mut r = Record::new(RecordId::Stored(id), t0() - Duration::milliseconds(*age));
            r.apply(&blank_fields(&schema));
            out.push(r);
        }
        for _ in 0..filled {
            id += 1;
            out.push(Record::new(RecordId::Stored(id), t0()).with("flotte", "F"));
        }
        out
    }

    #[test]
    fn test_creates_missing_rows() {
        let s = Schema::maintenance();
        assert_eq!(plan_supply(&grid(&[0; 4], 3), &s, 5, t0(), 5_000), SupplyPlan::Create(1));
        assert_eq!(plan_supply(&[], &s, 5, t0(), 5_000), SupplyPlan::Create(5));
    }

    #[test]
    fn test_steady_at_floor() {
        let s = Schema::maintenance();
        assert_eq!(plan_supply(&grid(&[0; 5], 10), &s, 5, t0(), 5_000), SupplyPlan::Steady);
    }

    #[test]
    fn test_deletes_oldest_excess_past_grace() {
        let s = Schema::maintenance();
        // ids 1..=7 with ages; ids 1, 2, 3 are past grace, 1 is oldest
        let records = grid(&[60_000, 10_000, 6_000, 1_000, 0, 0, 0], 0);
        assert_eq!(plan_supply(&records, &s, 5, t0(), 5_000), SupplyPlan::Delete(vec![1, 2]));
    }

    #[test]
    fn test_deletes_at_most_the_old_ones() {
        let s = Schema::maintenance();
        let records = grid(&[9_000, 0, 0, 0, 0, 0, 0, 0], 0);
        assert_eq!(plan_supply(&records, &s, 5, t0(), 5_000), SupplyPlan::Delete(vec![1]));
    }

    #[test]
    fn test_too_young() {
        let s = Schema::maintenance();
        let records = grid(&[100; 8], 0);
        assert_eq!(plan_supply(&records, &s, 5, t0(), 5_000), SupplyPlan::TooYoung);
    }
}
