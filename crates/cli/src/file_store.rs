// JSON file store: the in-memory store loaded from and saved to one file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use fleetgrid_engine::clock::Clock;
use fleetgrid_engine::record::FieldMap;
use fleetgrid_engine::{MemoryStore, Record, RecordKind, RecordStore, Schema, StoreError};

/// On-disk layout.
#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    kind: RecordKind,
    records: Vec<Record>,
}

#[derive(Debug)]
pub enum FileStoreError {
    Io { path: PathBuf, source: io::Error },
    Parse { path: PathBuf, message: String },
    WrongKind { path: PathBuf, found: RecordKind, wanted: RecordKind },
}

impl std::fmt::Display for FileStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "{}: {}", path.display(), source),
            Self::Parse { path, message } => write!(f, "{}: {}", path.display(), message),
            Self::WrongKind { path, found, wanted } => {
                write!(f, "{} holds {} records, not {}", path.display(), found, wanted)
            }
        }
    }
}

impl std::error::Error for FileStoreError {}

pub struct JsonFileStore {
    path: PathBuf,
    inner: MemoryStore,
    dirty: bool,
}

impl JsonFileStore {
    /// Open `path`, starting empty when the file does not exist yet.
    pub fn open(path: &Path, schema: Schema, clock: Rc<dyn Clock>) -> Result<Self, FileStoreError> {
        let records = if path.exists() {
            let text = fs::read_to_string(path)
                .map_err(|source| FileStoreError::Io { path: path.to_path_buf(), source })?;
            let file: StoreFile = serde_json::from_str(&text)
                .map_err(|e| FileStoreError::Parse { path: path.to_path_buf(), message: e.to_string() })?;
            if file.kind != schema.kind() {
                return Err(FileStoreError::WrongKind {
                    path: path.to_path_buf(),
                    found: file.kind,
                    wanted: schema.kind(),
                });
            }
            log::debug!("loaded {} records from {}", file.records.len(), path.display());
            file.records
        } else {
            log::debug!("{} does not exist; starting empty", path.display());
            Vec::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            inner: MemoryStore::with_records(schema, clock, records),
            dirty: false,
        })
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn save(&mut self) -> Result<(), FileStoreError> {
        let file = StoreFile { kind: self.inner.schema().kind(), records: self.inner.records() };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| FileStoreError::Parse { path: self.path.clone(), message: e.to_string() })?;
        fs::write(&self.path, json).map_err(|source| FileStoreError::Io { path: self.path.clone(), source })?;
        self.dirty = false;
        Ok(())
    }

    fn touched<T>(&mut self, result: Result<T, StoreError>) -> Result<T, StoreError> {
        if result.is_ok() {
            self.dirty = true;
        }
        result
    }
}

impl RecordStore for JsonFileStore {
    fn fetch_all(&mut self) -> Result<Vec<Record>, StoreError> {
        self.inner.fetch_all()
    }

    fn create(&mut self, fields: FieldMap) -> Result<Record, StoreError> {
        let result = self.inner.create(fields);
        self.touched(result)
    }

    fn create_batch(&mut self, rows: Vec<FieldMap>) -> Result<Vec<Record>, StoreError> {
        let result = self.inner.create_batch(rows);
        self.touched(result)
    }

    fn update(&mut self, id: i64, fields: FieldMap) -> Result<Record, StoreError> {
        let result = self.inner.update(id, fields);
        self.touched(result)
    }

    fn update_batch(&mut self, updates: Vec<(i64, FieldMap)>) -> Result<Vec<Record>, StoreError> {
        let result = self.inner.update_batch(updates);
        self.touched(result)
    }

    fn delete(&mut self, id: i64) -> Result<(), StoreError> {
        let result = self.inner.delete(id);
        self.touched(result)
    }

    fn delete_batch(&mut self, ids: Vec<i64>) -> Result<usize, StoreError> {
        let result = self.inner.delete_batch(ids);
        self.touched(result)
    }

    fn duplicate(&mut self, id: i64) -> Result<Record, StoreError> {
        let result = self.inner.duplicate(id);
        self.touched(result)
    }

    fn reorder(&mut self, orders: Vec<(i64, i64)>) -> Result<(), StoreError> {
        let result = self.inner.reorder(orders);
        self.touched(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use fleetgrid_engine::ManualClock;

    fn clock() -> Rc<dyn Clock> {
        Rc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()))
    }

    #[test]
    fn missing_file_starts_empty_and_saves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.json");

        let mut store = JsonFileStore::open(&path, Schema::maintenance(), clock()).unwrap();
        assert!(store.fetch_all().unwrap().is_empty());
        assert!(!store.is_dirty());

        store.create(FieldMap::new()).unwrap();
        assert!(store.is_dirty());
        store.save().unwrap();

        let mut reopened = JsonFileStore::open(&path, Schema::maintenance(), clock()).unwrap();
        assert_eq!(reopened.fetch_all().unwrap().len(), 1);
    }

    #[test]
    fn wrong_kind_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.json");
        let mut store = JsonFileStore::open(&path, Schema::contacts(), clock()).unwrap();
        store.save().unwrap();

        match JsonFileStore::open(&path, Schema::maintenance(), clock()) {
            Err(FileStoreError::WrongKind { found, .. }) => assert_eq!(found, RecordKind::Contact),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }
}
