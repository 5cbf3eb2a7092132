//! Records, field values, and the emptiness predicate.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dates;
use crate::schema::Schema;

/// Record identity. `Pending` marks a row created optimistically whose
/// create has not been confirmed by the store yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordId {
    Stored(i64),
    Pending(u64),
}

impl RecordId {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    pub fn stored(&self) -> Option<i64> {
        match self {
            Self::Stored(id) => Some(*id),
            Self::Pending(_) => None,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stored(id) => write!(f, "{id}"),
            Self::Pending(n) => write!(f, "pending-{n}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    #[default]
    Null,
    Text(String),
    Integer(i64),
    DateTime(NaiveDateTime),
}

static NULL_VALUE: FieldValue = FieldValue::Null;

impl FieldValue {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Null or "" (the only two spellings of "nothing here").
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.is_empty(),
            Self::Integer(_) | Self::DateTime(_) => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Self::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Text shown in a cell and written to the clipboard.
    pub fn display(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Text(s) => s.clone(),
            Self::Integer(n) => n.to_string(),
            Self::DateTime(dt) => dates::format_display(dt),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<NaiveDateTime> for FieldValue {
    fn from(dt: NaiveDateTime) -> Self {
        Self::DateTime(dt)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

pub type FieldMap = BTreeMap<String, FieldValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    #[serde(default)]
    pub fields: FieldMap,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Record {
    pub fn new(id: RecordId, created_at: DateTime<Utc>) -> Self {
        Self { id, fields: FieldMap::new(), created_at, updated_at: None }
    }

    /// Absent fields read as null.
    pub fn get(&self, field: &str) -> &FieldValue {
        self.fields.get(field).unwrap_or(&NULL_VALUE)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn with(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.set(field, value);
        self
    }

    /// Overlay a partial update.
    pub fn apply(&mut self, patch: &FieldMap) {
        for (k, v) in patch {
            self.fields.insert(k.clone(), v.clone());
        }
    }

    pub fn is_empty(&self, schema: &Schema) -> bool {
        schema.checked_fields().all(|f| self.get(f.name).is_blank())
    }
}

/// Field values for a brand-new blank row: "" for non-null text, null elsewhere.
pub fn blank_fields(schema: &Schema) -> FieldMap {
    use crate::schema::FieldKind;

    schema
        .columns()
        .map(|f| {
            let value = match f.kind {
                FieldKind::Text => FieldValue::text(""),
                _ => FieldValue::Null,
            };
            (f.name.to_string(), value)
        })
        .collect()
}

pub fn count_empty<'a>(records: impl IntoIterator<Item = &'a Record>, schema: &Schema) -> usize {
    records.into_iter().filter(|r| r.is_empty(schema)).count()
}

/// A partial record addressed by id, as produced by paste, fill and delete.
#[derive(Debug, Clone, PartialEq)]
pub struct RowPatch {
    pub id: RecordId,
    pub fields: FieldMap,
}

impl RowPatch {
    pub fn new(id: RecordId) -> Self {
        Self { id, fields: FieldMap::new() }
    }

    pub fn with(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn blank_record_is_empty() {
        let schema = Schema::maintenance();
        let mut r = Record::new(RecordId::Stored(1), at());
        r.apply(&blank_fields(&schema));
        assert!(r.is_empty(&schema));
    }

    #[test]
    fn any_checked_field_makes_it_non_empty() {
        let schema = Schema::maintenance();
        for field in schema.checked_fields() {
            let r = Record::new(RecordId::Stored(1), at()).with(field.name, "x");
            assert!(!r.is_empty(&schema), "{} should count", field.name);
        }
    }

    #[test]
    fn order_field_does_not_count() {
        let schema = Schema::contacts();
        let r = Record::new(RecordId::Stored(1), at()).with("ordre", 4i64);
        assert!(r.is_empty(&schema));
    }

    #[test]
    fn pending_ids_sort_after_stored() {
        assert!(RecordId::Stored(i64::MAX) < RecordId::Pending(0));
        assert_eq!(RecordId::Pending(3).to_string(), "pending-3");
    }
}
