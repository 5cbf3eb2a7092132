//! Column schemas for the two record kinds.
//!
//! The grid core is generic over "a record with an id and named fields";
//! a `Schema` supplies the column order, each field's kind, and which
//! fields decide emptiness.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Non-null text, defaults to "".
    Text,
    /// Text where "" is stored as null.
    NullableText,
    DateTime,
    /// Week number kept as text so "15/2027" survives.
    Week,
    /// One of `STATUS_OPTIONS`.
    Status,
    /// Manual ordering; maintained by the store, not editable in the grid.
    Order,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    /// Participates in the emptiness predicate.
    pub checked: bool,
}

impl FieldDef {
    const fn new(name: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self { name, label, kind, checked: true }
    }

    const fn unchecked(name: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self { name, label, kind, checked: false }
    }

    pub fn is_editable(&self) -> bool {
        self.kind != FieldKind::Order
    }
}

/// Appointment validation states, in menu order.
pub const STATUS_OPTIONS: [&str; 4] = [
    "Validé PHP",
    "Validé Pré-Op/Tactique",
    "En attente",
    "Refusé",
];

static MAINTENANCE_FIELDS: [FieldDef; 12] = [
    FieldDef::new("flotte", "Flotte", FieldKind::Text),
    FieldDef::new("engin", "Engin", FieldKind::Text),
    FieldDef::new("site", "Site", FieldKind::NullableText),
    FieldDef::new("semaine", "Semaine", FieldKind::Week),
    FieldDef::new("entree", "Entrée", FieldKind::DateTime),
    FieldDef::new("sortie", "Sortie", FieldKind::DateTime),
    FieldDef::new("codeOperation", "Code opération", FieldKind::Text),
    FieldDef::new("libelle", "Libellé", FieldKind::NullableText),
    FieldDef::new("numDi", "N° DI", FieldKind::NullableText),
    FieldDef::new("butee", "Butée", FieldKind::NullableText),
    FieldDef::new("validationRdv", "Validation RDV", FieldKind::Status),
    FieldDef::new("commentaires", "Commentaires", FieldKind::NullableText),
];

static CONTACT_FIELDS: [FieldDef; 7] = [
    FieldDef::unchecked("ordre", "Ordre", FieldKind::Order),
    FieldDef::new("site", "Site", FieldKind::Text),
    FieldDef::new("nom", "Nom", FieldKind::Text),
    FieldDef::new("fonction", "Fonction", FieldKind::NullableText),
    FieldDef::new("ligneInterne", "Ligne interne", FieldKind::NullableText),
    FieldDef::new("lignePortable", "Ligne portable", FieldKind::NullableText),
    FieldDef::new("observations", "Observations", FieldKind::NullableText),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Maintenance,
    Contact,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Maintenance => write!(f, "maintenance"),
            Self::Contact => write!(f, "contact"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    kind: RecordKind,
    fields: &'static [FieldDef],
}

impl Schema {
    pub fn maintenance() -> Self {
        Self { kind: RecordKind::Maintenance, fields: &MAINTENANCE_FIELDS }
    }

    pub fn contacts() -> Self {
        Self { kind: RecordKind::Contact, fields: &CONTACT_FIELDS }
    }

    pub fn for_kind(kind: RecordKind) -> Self {
        match kind {
            RecordKind::Maintenance => Self::maintenance(),
            RecordKind::Contact => Self::contacts(),
        }
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    /// Every field, including store-maintained ones.
    pub fn fields(&self) -> &'static [FieldDef] {
        self.fields
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Grid columns in display order (editable fields only).
    pub fn columns(&self) -> impl Iterator<Item = &'static FieldDef> {
        self.fields.iter().filter(|f| f.is_editable())
    }

    pub fn column_count(&self) -> usize {
        self.columns().count()
    }

    pub fn column(&self, index: usize) -> Option<&'static FieldDef> {
        self.columns().nth(index)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns().position(|f| f.name == name)
    }

    pub fn checked_fields(&self) -> impl Iterator<Item = &'static FieldDef> {
        self.fields.iter().filter(|f| f.checked)
    }

    pub fn order_field(&self) -> Option<&'static FieldDef> {
        self.fields.iter().find(|f| f.kind == FieldKind::Order)
    }

    /// Only the maintenance grid keeps a floor of blank rows.
    pub fn has_row_supply(&self) -> bool {
        self.kind == RecordKind::Maintenance
    }

    /// (start, end) date-time pair whose order is enforced.
    pub fn interval_fields(&self) -> Option<(&'static str, &'static str)> {
        match self.kind {
            RecordKind::Maintenance => Some(("entree", "sortie")),
            RecordKind::Contact => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maintenance_columns() {
        let s = Schema::maintenance();
        assert_eq!(s.column_count(), 12);
        assert_eq!(s.checked_fields().count(), 12);
        assert_eq!(s.column(0).map(|f| f.name), Some("flotte"));
        assert_eq!(s.column_index("validationRdv"), Some(10));
        assert!(s.has_row_supply());
    }

    #[test]
    fn contact_order_field_is_not_a_column() {
        let s = Schema::contacts();
        assert_eq!(s.column_count(), 6);
        assert_eq!(s.column(0).map(|f| f.name), Some("site"));
        assert_eq!(s.order_field().map(|f| f.name), Some("ordre"));
        assert_eq!(s.checked_fields().count(), 6);
        assert!(!s.has_row_supply());
        assert!(s.interval_fields().is_none());
    }
}
