//! Record store contract and the in-process implementation.
//!
//! The grid never calls a store directly; it emits requests that a host
//! runs against a `RecordStore` (see `harness::execute` and
//! `GridHarness::run_pending`). `MemoryStore` enforces the same
//! server-side rules as a real backend: sequential ids, creation
//! timestamps, manual ordering for contacts, and the entry/exit check.

use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use crate::clock::Clock;
use crate::error::StoreError;
use crate::record::{blank_fields, FieldMap, FieldValue, Record, RecordId};
use crate::schema::Schema;

pub trait RecordStore {
    fn fetch_all(&mut self) -> Result<Vec<Record>, StoreError>;
    fn create(&mut self, fields: FieldMap) -> Result<Record, StoreError>;
    fn create_batch(&mut self, rows: Vec<FieldMap>) -> Result<Vec<Record>, StoreError>;
    fn update(&mut self, id: i64, fields: FieldMap) -> Result<Record, StoreError>;
    fn update_batch(&mut self, updates: Vec<(i64, FieldMap)>) -> Result<Vec<Record>, StoreError>;
    fn delete(&mut self, id: i64) -> Result<(), StoreError>;
    /// Returns how many rows were removed; unknown ids are ignored.
    fn delete_batch(&mut self, ids: Vec<i64>) -> Result<usize, StoreError>;
    fn duplicate(&mut self, id: i64) -> Result<Record, StoreError>;
    /// Rewrite the manual ordering field.
    fn reorder(&mut self, orders: Vec<(i64, i64)>) -> Result<(), StoreError>;
}

/// One entry per store call, for asserting batching in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    FetchAll,
    Create,
    CreateBatch(usize),
    Update(i64),
    UpdateBatch(usize),
    Delete(i64),
    DeleteBatch(usize),
    Duplicate(i64),
    Reorder(usize),
}

impl StoreCall {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::FetchAll)
    }
}

pub struct MemoryStore {
    schema: Schema,
    clock: Rc<dyn Clock>,
    records: BTreeMap<i64, Record>,
    next_id: i64,
    failures: VecDeque<StoreError>,
    calls: Vec<StoreCall>,
}

impl MemoryStore {
    pub fn new(schema: Schema, clock: Rc<dyn Clock>) -> Self {
        Self {
            schema,
            clock,
            records: BTreeMap::new(),
            next_id: 1,
            failures: VecDeque::new(),
            calls: Vec::new(),
        }
    }

    /// Load previously persisted records. Pending ids are dropped.
    pub fn with_records(schema: Schema, clock: Rc<dyn Clock>, records: Vec<Record>) -> Self {
        let mut store = Self::new(schema, clock);
        for record in records {
            if let RecordId::Stored(id) = record.id {
                store.next_id = store.next_id.max(id + 1);
                store.records.insert(id, record);
            }
        }
        store
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&Record> {
        self.records.get(&id)
    }

    /// Records in the order `fetch_all` returns them.
    pub fn records(&self) -> Vec<Record> {
        let mut all: Vec<Record> = self.records.values().cloned().collect();
        if let Some(order) = self.schema.order_field() {
            all.sort_by_key(|r| (r.get(order.name).as_integer().unwrap_or(i64::MAX), r.id));
        }
        all
    }

    /// Fail the next mutating call with `err`. Queued failures are
    /// consumed in order.
    pub fn fail_next(&mut self, err: StoreError) {
        self.failures.push_back(err);
    }

    pub fn calls(&self) -> &[StoreCall] {
        &self.calls
    }

    pub fn mutation_calls(&self) -> Vec<&StoreCall> {
        self.calls.iter().filter(|c| c.is_mutation()).collect()
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    fn record_call(&mut self, call: StoreCall) -> Result<(), StoreError> {
        let mutation = call.is_mutation();
        self.calls.push(call);
        if mutation {
            if let Some(err) = self.failures.pop_front() {
                return Err(err);
            }
        }
        Ok(())
    }

    fn next_order(&self) -> i64 {
        let Some(order) = self.schema.order_field() else {
            return 0;
        };
        self.records
            .values()
            .filter_map(|r| r.get(order.name).as_integer())
            .max()
            .map_or(1, |max| max + 1)
    }

    fn check_interval(&self, fields: &FieldMap, row: Option<i64>) -> Result<(), StoreError> {
        let Some((start, end)) = self.schema.interval_fields() else {
            return Ok(());
        };
        let existing = row.and_then(|id| self.records.get(&id));
        let pick = |name: &str| {
            fields
                .get(name)
                .or_else(|| existing.map(|r| r.get(name)))
                .and_then(FieldValue::as_datetime)
        };
        match (pick(start), pick(end)) {
            (Some(entry), Some(exit)) if exit < entry => {
                let message = "exit date is before entry date";
                Err(StoreError::validation(match row {
                    Some(id) => format!("row {id}: {message}"),
                    None => message.to_string(),
                }))
            }
            _ => Ok(()),
        }
    }

    fn insert(&mut self, fields: FieldMap) -> Record {
        let id = self.next_id;
        self.next_id += 1;

        let mut record = Record::new(RecordId::Stored(id), self.clock.now());
        record.apply(&blank_fields(&self.schema));
        record.apply(&fields);
        if let Some(order) = self.schema.order_field() {
            record.set(order.name, self.next_order());
        }
        self.records.insert(id, record.clone());
        record
    }

    fn patch(&mut self, id: i64, fields: &FieldMap) -> Result<Record, StoreError> {
        let now = self.clock.now();
        let record = self
            .records
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(format!("row {id}")))?;
        record.apply(fields);
        record.updated_at = Some(now);
        Ok(record.clone())
    }
}

impl RecordStore for MemoryStore {
    fn fetch_all(&mut self) -> Result<Vec<Record>, StoreError> {
        self.record_call(StoreCall::FetchAll)?;
        Ok(self.records())
    }

    fn create(&mut self, fields: FieldMap) -> Result<Record, StoreError> {
        self.record_call(StoreCall::Create)?;
        self.check_interval(&fields, None)?;
        Ok(self.insert(fields))
    }

    fn create_batch(&mut self, rows: Vec<FieldMap>) -> Result<Vec<Record>, StoreError> {
        self.record_call(StoreCall::CreateBatch(rows.len()))?;
        for fields in &rows {
            self.check_interval(fields, None)?;
        }
        Ok(rows.into_iter().map(|fields| self.insert(fields)).collect())
    }

    fn update(&mut self, id: i64, fields: FieldMap) -> Result<Record, StoreError> {
        self.record_call(StoreCall::Update(id))?;
        if !self.records.contains_key(&id) {
            return Err(StoreError::not_found(format!("row {id}")));
        }
        self.check_interval(&fields, Some(id))?;
        self.patch(id, &fields)
    }

    fn update_batch(&mut self, updates: Vec<(i64, FieldMap)>) -> Result<Vec<Record>, StoreError> {
        self.record_call(StoreCall::UpdateBatch(updates.len()))?;
        // Validate everything first so a rejected batch changes nothing
        for (id, fields) in &updates {
            if fields.is_empty() {
                continue;
            }
            if !self.records.contains_key(id) {
                return Err(StoreError::not_found(format!("row {id}")));
            }
            self.check_interval(fields, Some(*id))?;
        }
        let mut out = Vec::with_capacity(updates.len());
        for (id, fields) in updates {
            if !fields.is_empty() {
                out.push(self.patch(id, &fields)?);
            }
        }
        Ok(out)
    }

    fn delete(&mut self, id: i64) -> Result<(), StoreError> {
        self.record_call(StoreCall::Delete(id))?;
        self.records
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(format!("row {id}")))
    }

    fn delete_batch(&mut self, ids: Vec<i64>) -> Result<usize, StoreError> {
        self.record_call(StoreCall::DeleteBatch(ids.len()))?;
        Ok(ids.iter().filter(|id| self.records.remove(*id).is_some()).count())
    }

    fn duplicate(&mut self, id: i64) -> Result<Record, StoreError> {
        self.record_call(StoreCall::Duplicate(id))?;
        let source = self
            .records
            .get(&id)
            .ok_or_else(|| StoreError::not_found(format!("row {id}")))?;
        let mut fields = source.fields.clone();
        if let Some(order) = self.schema.order_field() {
            fields.remove(order.name);
        }
        Ok(self.insert(fields))
    }

    fn reorder(&mut self, orders: Vec<(i64, i64)>) -> Result<(), StoreError> {
        self.record_call(StoreCall::Reorder(orders.len()))?;
        let order = self
            .schema
            .order_field()
            .ok_or_else(|| StoreError::validation(format!("{} rows have no manual order", self.schema.kind())))?;
        if let Some((missing, _)) = orders.iter().find(|(id, _)| !self.records.contains_key(id)) {
            return Err(StoreError::not_found(format!("row {missing}")));
        }
        for (id, ordre) in orders {
            if let Some(record) = self.records.get_mut(&id) {
                record.set(order.name, ordre);
            }
        }
        Ok(())
    }
}
