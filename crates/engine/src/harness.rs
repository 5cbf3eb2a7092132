//! Harness that runs a `GridController` against a `RecordStore`.
//!
//! The controller only queues requests; this drives them to completion
//! in issue order and moves a manual clock so debounce and guard timers
//! fire deterministically. Used by the command line tool and by tests.

use std::rc::Rc;

use chrono::{DateTime, Duration, Utc};
use fleetgrid_config::GridSettings;
use fleetgrid_core::{ClipboardPort, MemoryClipboard};

use crate::clock::{Clock, ManualClock};
use crate::grid::{GridController, GridSnapshot, Outcome, StoreOp};
use crate::record::Record;
use crate::schema::Schema;
use crate::store::{MemoryStore, RecordStore};

/// Upper bound on request rounds per drive, in case completions keep
/// producing work.
const MAX_ROUNDS: usize = 10_000;

/// Run one store operation and wrap the result for `complete`.
pub fn execute<S: RecordStore + ?Sized>(store: &mut S, op: StoreOp) -> Outcome {
    let result = match op {
        StoreOp::FetchAll => store.fetch_all().map(Outcome::Fetched),
        StoreOp::Create { fields } => store.create(fields).map(Outcome::Created),
        StoreOp::CreateBatch { rows } => store.create_batch(rows).map(Outcome::CreatedBatch),
        StoreOp::Update { id, fields } => store.update(id, fields).map(Outcome::Updated),
        StoreOp::UpdateBatch { updates } => store.update_batch(updates).map(Outcome::UpdatedBatch),
        StoreOp::Delete { id } => store.delete(id).map(|()| Outcome::Deleted(1)),
        StoreOp::DeleteBatch { ids } => store.delete_batch(ids).map(Outcome::Deleted),
        StoreOp::Duplicate { id } => store.duplicate(id).map(Outcome::Created),
        StoreOp::Reorder { orders } => store.reorder(orders).map(|()| Outcome::Reordered),
    };
    result.unwrap_or_else(Outcome::Failed)
}

pub struct GridHarness<S: RecordStore> {
    grid: GridController,
    store: S,
    clock: ManualClock,
}

impl GridHarness<MemoryStore> {
    /// Controller and in-memory store sharing one manual clock, with the
    /// initial fetch already applied.
    pub fn in_memory(schema: Schema, settings: GridSettings, start: DateTime<Utc>, records: Vec<Record>) -> Self {
        let clock = ManualClock::new(start);
        let store = MemoryStore::with_records(schema, Rc::new(clock.clone()), records);
        Self::with_clipboard(store, schema, settings, clock, Box::new(MemoryClipboard::new()))
    }
}

impl<S: RecordStore> GridHarness<S> {
    pub fn new(store: S, schema: Schema, settings: GridSettings, clock: ManualClock) -> Self {
        Self::with_clipboard(store, schema, settings, clock, Box::new(MemoryClipboard::new()))
    }

    pub fn with_clipboard(
        store: S,
        schema: Schema,
        settings: GridSettings,
        clock: ManualClock,
        clipboard: Box<dyn ClipboardPort>,
    ) -> Self {
        let grid = GridController::new(schema, settings, Rc::new(clock.clone()), clipboard);
        let mut harness = Self { grid, store, clock };
        harness.grid.load();
        harness.run_pending();
        harness
    }

    pub fn grid(&self) -> &GridController {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut GridController {
        &mut self.grid
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Execute queued requests until the outbox stays empty.
    pub fn run_pending(&mut self) -> GridSnapshot {
        for _ in 0..MAX_ROUNDS {
            let requests = self.grid.take_requests();
            if requests.is_empty() {
                return self.grid.snapshot();
            }
            for request in requests {
                log::trace!("running request {:?}: {}", request.id, request.op.name());
                let outcome = execute(&mut self.store, request.op);
                self.grid.complete(request.id, outcome);
            }
        }
        log::warn!("store requests still queued after {} rounds", MAX_ROUNDS);
        self.grid.snapshot()
    }

    /// Move the clock forward, firing every timer that falls due on the way.
    pub fn advance(&mut self, ms: i64) -> GridSnapshot {
        let target = self.clock.now() + Duration::milliseconds(ms);
        while let Some(due) = self.grid.next_due().filter(|due| *due <= target) {
            self.clock.set(due.max(self.clock.now()));
            self.grid.tick();
            self.run_pending();
        }
        self.clock.set(target);
        self.grid.tick();
        self.run_pending()
    }

    /// Fire timers until none are left.
    pub fn settle(&mut self) -> GridSnapshot {
        self.run_pending();
        for _ in 0..MAX_ROUNDS {
            let Some(due) = self.grid.next_due() else {
                return self.grid.snapshot();
            };
            self.clock.set(due.max(self.clock.now()));
            self.grid.tick();
            self.run_pending();
        }
        log::warn!("timers still pending after {} rounds", MAX_ROUNDS);
        self.grid.snapshot()
    }
}
