use std::fmt;

use crate::record::RecordId;

#[derive(Debug, Clone, PartialEq)]
pub enum GridError {
    /// Cross-field check failed; the whole operation was aborted.
    Validation { row: RecordId, message: String },
    /// The row-supply invariant could not be restored.
    Invariant(String),
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation { row, message } => write!(f, "row {row}: {message}"),
            Self::Invariant(msg) => write!(f, "row supply: {msg}"),
        }
    }
}

impl std::error::Error for GridError {}

#[derive(Debug, Clone, PartialEq)]
pub enum NormalizeError {
    /// Text on a date-time column that matches no accepted format.
    BadDate { field: String, value: String },
    /// Text on a status column that is not one of the options.
    UnknownStatus { field: String, value: String },
    /// Column does not exist in the schema.
    UnknownField(String),
    /// Column is maintained by the store, not the grid.
    ReadOnly(String),
}

impl fmt::Display for NormalizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadDate { field, value } => {
                write!(f, "field '{field}': cannot parse date '{value}'")
            }
            Self::UnknownStatus { field, value } => {
                write!(f, "field '{field}': unknown status '{value}'")
            }
            Self::UnknownField(field) => write!(f, "unknown field '{field}'"),
            Self::ReadOnly(field) => write!(f, "field '{field}' is not editable"),
        }
    }
}

impl std::error::Error for NormalizeError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    NotFound,
    Validation,
    Unavailable,
    Io,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self { kind: StoreErrorKind::NotFound, message: msg.into() }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self { kind: StoreErrorKind::Validation, message: msg.into() }
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self { kind: StoreErrorKind::Unavailable, message: msg.into() }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { kind: StoreErrorKind::Io, message: msg.into() }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            StoreErrorKind::NotFound => "not found",
            StoreErrorKind::Validation => "rejected",
            StoreErrorKind::Unavailable => "unavailable",
            StoreErrorKind::Io => "IO error",
        };
        write!(f, "store {kind}: {}", self.message)
    }
}

impl std::error::Error for StoreError {}
