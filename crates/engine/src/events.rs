//! Event types for grid notifications.
//!
//! The controller pushes events as operations are dispatched, complete, or
//! fail. Hosts drain them to show alerts; tests use them to verify that a
//! rejected batch raised a notice and never reached the store.

use crate::record::RecordId;
use crate::txlog::TxId;

/// Notice titles shown to the user.
pub const TITLE_CREATE_FAILED: &str = "Create failed";
pub const TITLE_UPDATE_FAILED: &str = "Update failed";
pub const TITLE_DELETE_FAILED: &str = "Delete failed";
pub const TITLE_DATE_VALIDATION: &str = "Date validation";
pub const TITLE_CLIPBOARD: &str = "Clipboard";

#[derive(Debug, Clone, PartialEq)]
pub enum GridEvent {
    /// Something the user should see (alert dialog in a UI host).
    Notice { title: String, message: String },

    /// A transaction was rolled back to its pre-image after a store failure.
    RolledBack { tx: TxId, rows: Vec<RecordId> },

    /// Optimistic rows were confirmed by the store.
    RowsConfirmed { pending: Vec<RecordId>, stored: Vec<RecordId> },

    /// A paste that needed new rows was applied.
    PasteApplied { rows: usize },
}

impl GridEvent {
    pub fn notice(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Notice { title: title.into(), message: message.into() }
    }
}

/// Event collector drained by hosts and inspected by tests.
#[derive(Debug, Default)]
pub struct EventCollector {
    events: Vec<GridEvent>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn push(&mut self, event: GridEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[GridEvent] {
        &self.events
    }

    pub fn drain(&mut self) -> Vec<GridEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// (title, message) of every notice, oldest first.
    pub fn notices(&self) -> Vec<(&str, &str)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                GridEvent::Notice { title, message } => Some((title.as_str(), message.as_str())),
                _ => None,
            })
            .collect()
    }

    pub fn rollbacks(&self) -> Vec<TxId> {
        self.events
            .iter()
            .filter_map(|e| match e {
                GridEvent::RolledBack { tx, .. } => Some(*tx),
                _ => None,
            })
            .collect()
    }
}
