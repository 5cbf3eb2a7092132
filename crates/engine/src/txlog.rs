//! Transaction log for optimistic mutations.
//!
//! Each optimistic operation records the pre-image of every row it touched
//! so a store failure can restore exactly those rows.

use crate::record::{Record, RecordId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    Pending,
    Committed,
    RolledBack,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: TxId,
    pub label: String,
    /// Row state before the change. `None` means the row did not exist
    /// (an optimistic create), so rolling back removes it.
    pub pre_image: Vec<(RecordId, Option<Record>)>,
    pub outcome: TxOutcome,
}

pub struct TxLog {
    entries: Vec<Transaction>,
    next_id: u64,
    max_entries: usize,
}

impl Default for TxLog {
    fn default() -> Self {
        Self::new()
    }
}

impl TxLog {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
            max_entries: 100,
        }
    }

    pub fn begin(&mut self, label: impl Into<String>, pre_image: Vec<(RecordId, Option<Record>)>) -> TxId {
        let id = TxId(self.next_id);
        self.next_id += 1;
        self.entries.push(Transaction {
            id,
            label: label.into(),
            pre_image,
            outcome: TxOutcome::Pending,
        });

        // Limit log size, oldest settled entries first
        while self.entries.len() > self.max_entries {
            match self.entries.iter().position(|t| t.outcome != TxOutcome::Pending) {
                Some(i) => {
                    self.entries.remove(i);
                }
                None => break,
            }
        }
        id
    }

    pub fn get(&self, id: TxId) -> Option<&Transaction> {
        self.entries.iter().find(|t| t.id == id)
    }

    pub fn commit(&mut self, id: TxId) {
        self.settle(id, TxOutcome::Committed);
    }

    /// Mark rolled back and hand back the pre-image to restore.
    pub fn roll_back(&mut self, id: TxId) -> Vec<(RecordId, Option<Record>)> {
        match self.settle(id, TxOutcome::RolledBack) {
            Some(tx) => tx.pre_image.clone(),
            None => Vec::new(),
        }
    }

    fn settle(&mut self, id: TxId, outcome: TxOutcome) -> Option<&Transaction> {
        let tx = self.entries.iter_mut().find(|t| t.id == id)?;
        if tx.outcome == TxOutcome::Pending {
            tx.outcome = outcome;
        }
        Some(tx)
    }

    /// Follow a pending row into its stored identity so a later rollback
    /// of an edit made before confirmation targets the right row.
    pub fn rename(&mut self, from: RecordId, to: RecordId) {
        for tx in self.entries.iter_mut().filter(|t| t.outcome == TxOutcome::Pending) {
            for (id, record) in tx.pre_image.iter_mut() {
                if *id == from {
                    *id = to;
                    if let Some(r) = record {
                        r.id = to;
                    }
                }
            }
        }
    }

    pub fn entries(&self) -> &[Transaction] {
        &self.entries
    }

    pub fn pending(&self) -> usize {
        self.entries.iter().filter(|t| t.outcome == TxOutcome::Pending).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn row(id: i64) -> Record {
        Record::new(RecordId::Stored(id), Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
            .with("flotte", "before")
    }

    #[test]
    fn test_commit_and_roll_back() {
        let mut log = TxLog::new();
        let a = log.begin("update", vec![(RecordId::Stored(1), Some(row(1)))]);
        let b = log.begin("create", vec![(RecordId::Pending(1), None)]);
        assert_eq!(log.pending(), 2);

        log.commit(a);
        let restore = log.roll_back(b);
        assert_eq!(restore, vec![(RecordId::Pending(1), None)]);
        assert_eq!(log.get(a).map(|t| t.outcome), Some(TxOutcome::Committed));
        assert_eq!(log.get(b).map(|t| t.outcome), Some(TxOutcome::RolledBack));

        // Settled transactions stay settled
        log.roll_back(a);
        assert_eq!(log.get(a).map(|t| t.outcome), Some(TxOutcome::Committed));
    }

    #[test]
    fn test_cap_keeps_pending_entries() {
        let mut log = TxLog::new();
        let first = log.begin("held", Vec::new());
        for _ in 0..150 {
            let id = log.begin("done", Vec::new());
            log.commit(id);
        }
        assert!(log.entries().len() <= 101);
        assert!(log.get(first).is_some());
    }

    #[test]
    fn test_rename_pending_row() {
        let mut log = TxLog::new();
        let mut pending = row(0);
        pending.id = RecordId::Pending(7);
        let tx = log.begin("edit", vec![(RecordId::Pending(7), Some(pending))]);
        log.rename(RecordId::Pending(7), RecordId::Stored(40));
        let restore = log.roll_back(tx);
        assert_eq!(restore[0].0, RecordId::Stored(40));
        assert_eq!(restore[0].1.as_ref().map(|r| r.id), Some(RecordId::Stored(40)));
    }
}
