//! Per-field value normalization shared by the single-cell and batch paths.

use crate::dates::parse_date_text;
use crate::error::NormalizeError;
use crate::record::FieldValue;
use crate::schema::{FieldDef, FieldKind, Schema, STATUS_OPTIONS};

/// Normalize a value for `field`, resolving the field through the schema.
pub fn normalize(schema: &Schema, field: &str, value: FieldValue) -> Result<FieldValue, NormalizeError> {
    let def = schema
        .field(field)
        .ok_or_else(|| NormalizeError::UnknownField(field.to_string()))?;
    normalize_field(def, value)
}

pub fn normalize_field(def: &FieldDef, value: FieldValue) -> Result<FieldValue, NormalizeError> {
    match def.kind {
        FieldKind::Order => Err(NormalizeError::ReadOnly(def.name.to_string())),
        FieldKind::Text => Ok(match value {
            FieldValue::Null => FieldValue::text(""),
            FieldValue::Text(s) => FieldValue::Text(s),
            other => FieldValue::Text(other.display()),
        }),
        FieldKind::NullableText => Ok(match value {
            FieldValue::Text(s) if s.is_empty() => FieldValue::Null,
            FieldValue::Null => FieldValue::Null,
            FieldValue::Text(s) => FieldValue::Text(s),
            other => FieldValue::Text(other.display()),
        }),
        FieldKind::Week => Ok(match value {
            FieldValue::Integer(n) => FieldValue::Text(n.to_string()),
            v if v.is_blank() => FieldValue::Null,
            FieldValue::Text(s) => FieldValue::Text(s.trim().to_string()),
            other => FieldValue::Text(other.display()),
        }),
        FieldKind::DateTime => match value {
            FieldValue::DateTime(dt) => Ok(FieldValue::DateTime(dt)),
            v if v.is_blank() => Ok(FieldValue::Null),
            FieldValue::Text(s) if s.trim().is_empty() => Ok(FieldValue::Null),
            other => {
                let text = other.display();
                parse_date_text(&text)
                    .map(FieldValue::DateTime)
                    .ok_or(NormalizeError::BadDate { field: def.name.to_string(), value: text })
            }
        },
        FieldKind::Status => match value {
            v if v.is_blank() => Ok(FieldValue::Null),
            other => {
                let text = other.display();
                let wanted = text.trim();
                STATUS_OPTIONS
                    .iter()
                    .find(|opt| opt.to_lowercase() == wanted.to_lowercase())
                    .map(|opt| FieldValue::text(*opt))
                    .ok_or(NormalizeError::UnknownStatus { field: def.name.to_string(), value: text })
            }
        },
    }
}

/// Raw clipboard text as a field value. Whitespace-only text is null,
/// except in non-null text columns, which keep it verbatim so a copied
/// cell pastes back unchanged.
pub fn pasted_value(def: &FieldDef, text: &str) -> FieldValue {
    if text.trim().is_empty() && def.kind != FieldKind::Text {
        FieldValue::Null
    } else {
        FieldValue::text(text)
    }
}

/// Normalize raw cell text from the clipboard.
pub fn normalize_pasted(schema: &Schema, field: &str, text: &str) -> Result<FieldValue, NormalizeError> {
    let def = schema
        .field(field)
        .ok_or_else(|| NormalizeError::UnknownField(field.to_string()))?;
    normalize_field(def, pasted_value(def, text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn maint(field: &str, value: FieldValue) -> Result<FieldValue, NormalizeError> {
        normalize(&Schema::maintenance(), field, value)
    }

    #[test]
    fn test_text_never_null() {
        assert_eq!(maint("flotte", FieldValue::Null), Ok(FieldValue::text("")));
        assert_eq!(maint("flotte", "".into()), Ok(FieldValue::text("")));
        assert_eq!(maint("engin", "E12".into()), Ok(FieldValue::text("E12")));
    }

    #[test]
    fn test_nullable_text_empty_is_null() {
        assert_eq!(maint("site", "".into()), Ok(FieldValue::Null));
        assert_eq!(maint("site", "Lyon".into()), Ok(FieldValue::text("Lyon")));
    }

    #[test]
    fn test_week_is_text() {
        assert_eq!(maint("semaine", FieldValue::Integer(7)), Ok(FieldValue::text("7")));
        assert_eq!(maint("semaine", "15/2027".into()), Ok(FieldValue::text("15/2027")));
        assert_eq!(maint("semaine", "".into()), Ok(FieldValue::Null));
    }

    #[test]
    fn test_datetime_parsing() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap().and_hms_opt(9, 0, 0).unwrap();
        assert_eq!(maint("entree", "2024-01-10T09:00".into()), Ok(FieldValue::DateTime(expected)));
        assert_eq!(maint("entree", "10/1/2024 9:00".into()), Ok(FieldValue::DateTime(expected)));
        assert_eq!(maint("sortie", "".into()), Ok(FieldValue::Null));
        assert!(matches!(
            maint("sortie", "demain".into()),
            Err(NormalizeError::BadDate { .. })
        ));
    }

    #[test]
    fn test_status_canonical_spelling() {
        assert_eq!(
            maint("validationRdv", "  en attente ".into()),
            Ok(FieldValue::text("En attente"))
        );
        assert_eq!(
            maint("validationRdv", "VALIDÉ PHP".into()),
            Ok(FieldValue::text("Validé PHP"))
        );
        assert!(matches!(
            maint("validationRdv", "peut-être".into()),
            Err(NormalizeError::UnknownStatus { .. })
        ));
    }

    #[test]
    fn test_unknown_and_readonly_fields() {
        assert!(matches!(maint("nope", "x".into()), Err(NormalizeError::UnknownField(_))));
        assert!(matches!(
            normalize(&Schema::contacts(), "ordre", FieldValue::Integer(2)),
            Err(NormalizeError::ReadOnly(_))
        ));
    }

    #[test]
    fn test_pasted_whitespace() {
        let s = Schema::maintenance();
        assert_eq!(normalize_pasted(&s, "site", "   "), Ok(FieldValue::Null));
        assert_eq!(normalize_pasted(&s, "entree", " \t"), Ok(FieldValue::Null));
        assert_eq!(normalize_pasted(&s, "flotte", " "), Ok(FieldValue::text(" ")));
        assert_eq!(normalize_pasted(&s, "flotte", ""), Ok(FieldValue::text("")));
    }
}
