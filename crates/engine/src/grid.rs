//! The grid controller.
//!
//! Owns the current record snapshot and every piece of interaction state:
//! selection, pending paste, guards, timers, and the transaction log.
//! Store calls are never made inline. Operations push `StoreRequest`s into
//! an outbox; the host runs them (in any order) and reports each result
//! through `complete`. Time only moves through `tick`, so debounce and
//! cool-down behavior is fully deterministic under a manual clock.
//!
//! Every public operation returns an immutable `GridSnapshot`.

use std::collections::HashMap;
use std::rc::Rc;

use chrono::{DateTime, NaiveDateTime, Utc};
use fleetgrid_config::GridSettings;
use fleetgrid_core::clipboard::{self, ClipboardPort};
use fleetgrid_core::{Coord, Direction, FillRange, Range, Selection, SelectionSnapshot};

use crate::clock::Clock;
use crate::dates::week_label;
use crate::error::{GridError, StoreError};
use crate::events::{
    EventCollector, GridEvent, TITLE_CLIPBOARD, TITLE_CREATE_FAILED, TITLE_DATE_VALIDATION,
    TITLE_DELETE_FAILED, TITLE_UPDATE_FAILED,
};
use crate::normalize::pasted_value;
use crate::reconcile::{plan_batch, plan_cell, BatchPlan, CellEdit, CellPlan};
use crate::record::{blank_fields, FieldMap, FieldValue, Record, RecordId, RowPatch};
use crate::scheduler::{Scheduler, TaskKind};
use crate::schema::{RecordKind, Schema};
use crate::supply::{plan_supply, SupplyPlan};
use crate::txlog::{TxId, TxLog};
use crate::view::{
    butee_hint, group_positions, row_tone, visible_window, ButeeHint, GroupPosition, RowTone, RowView,
    ViewFilters, Viewport, VisibleWindow,
};

// =============================================================================
// Store requests and outcomes
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub enum StoreOp {
    FetchAll,
    Create { fields: FieldMap },
    CreateBatch { rows: Vec<FieldMap> },
    Update { id: i64, fields: FieldMap },
    UpdateBatch { updates: Vec<(i64, FieldMap)> },
    Delete { id: i64 },
    DeleteBatch { ids: Vec<i64> },
    Duplicate { id: i64 },
    Reorder { orders: Vec<(i64, i64)> },
}

impl StoreOp {
    pub fn name(&self) -> &'static str {
        match self {
            Self::FetchAll => "fetch_all",
            Self::Create { .. } => "create",
            Self::CreateBatch { .. } => "create_batch",
            Self::Update { .. } => "update",
            Self::UpdateBatch { .. } => "update_batch",
            Self::Delete { .. } => "delete",
            Self::DeleteBatch { .. } => "delete_batch",
            Self::Duplicate { .. } => "duplicate",
            Self::Reorder { .. } => "reorder",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreRequest {
    pub id: RequestId,
    pub op: StoreOp,
}

/// Result of running a `StoreOp`, reported back through `complete`.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Fetched(Vec<Record>),
    Created(Record),
    CreatedBatch(Vec<Record>),
    Updated(Record),
    UpdatedBatch(Vec<Record>),
    Deleted(usize),
    Reordered,
    Failed(StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Guard {
    /// Held while the row floor is being restored.
    Supply,
    /// Held while a batch edit (or the row creation it needs) is in flight.
    Batch,
}

/// Why a request was issued and what to do when it settles.
#[derive(Debug, Clone)]
struct InFlight {
    title: &'static str,
    tx: Option<TxId>,
    /// Placeholder rows this create will confirm, in request order.
    pending: Vec<RecordId>,
    guard: Option<Guard>,
    refetch: bool,
}

impl InFlight {
    fn new(title: &'static str) -> Self {
        Self { title, tx: None, pending: Vec::new(), guard: None, refetch: false }
    }

    fn with_tx(mut self, tx: TxId) -> Self {
        self.tx = Some(tx);
        self
    }

    fn with_pending(mut self, pending: Vec<RecordId>) -> Self {
        self.pending = pending;
        self
    }

    fn guarded(mut self, guard: Guard) -> Self {
        self.guard = Some(guard);
        self
    }

    fn refetching(mut self) -> Self {
        self.refetch = true;
        self
    }
}

// =============================================================================
// Snapshots
// =============================================================================

/// Paste waiting for its target rows to exist.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingPaste {
    pub at: Coord,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    Copy,
    Paste,
    /// Clear every selected cell.
    Delete,
    ExtendToEdge(Direction),
    Escape,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowSnapshot {
    pub id: RecordId,
    /// Display text per grid column.
    pub cells: Vec<String>,
    pub empty: bool,
    pub group: GroupPosition,
    pub tone: RowTone,
    pub butee: Option<ButeeHint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridSnapshot {
    pub kind: RecordKind,
    pub columns: Vec<&'static str>,
    /// Visible rows in display order.
    pub rows: Vec<RowSnapshot>,
    pub total_non_empty: usize,
    pub visible_non_empty: usize,
    pub is_filtered: bool,
    pub selection: SelectionSnapshot,
    pub pending_paste: Option<PendingPaste>,
    pub supply_guard: bool,
    pub batch_guard: bool,
    pub in_flight: usize,
}

impl GridSnapshot {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row)?.cells.get(col).map(String::as_str)
    }

    pub fn ids(&self) -> Vec<RecordId> {
        self.rows.iter().map(|r| r.id).collect()
    }

    pub fn empty_rows(&self) -> usize {
        self.rows.iter().filter(|r| r.empty).count()
    }
}

// =============================================================================
// GridController
// =============================================================================

pub struct GridController {
    schema: Schema,
    settings: GridSettings,
    clock: Rc<dyn Clock>,
    clipboard: Box<dyn ClipboardPort>,

    records: Vec<Record>,
    filters: ViewFilters,
    view: RowView,
    selection: Selection,
    pending_paste: Option<PendingPaste>,
    /// Edits to rows still awaiting their create, re-sent once confirmed.
    deferred: Vec<RowPatch>,

    scheduler: Scheduler,
    supply_guard: bool,
    batch_guard: bool,

    next_request: u64,
    next_pending: u64,
    outbox: Vec<StoreRequest>,
    in_flight: HashMap<RequestId, InFlight>,
    txlog: TxLog,
    events: EventCollector,
}

impl GridController {
    pub fn new(
        schema: Schema,
        settings: GridSettings,
        clock: Rc<dyn Clock>,
        clipboard: Box<dyn ClipboardPort>,
    ) -> Self {
        Self {
            schema,
            settings,
            clock,
            clipboard,
            records: Vec::new(),
            filters: ViewFilters::default(),
            view: RowView::default(),
            selection: Selection::new(),
            pending_paste: None,
            deferred: Vec::new(),
            scheduler: Scheduler::new(),
            supply_guard: false,
            batch_guard: false,
            next_request: 0,
            next_pending: 0,
            outbox: Vec::new(),
            in_flight: HashMap::new(),
            txlog: TxLog::new(),
            events: EventCollector::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn settings(&self) -> &GridSettings {
        &self.settings
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn record(&self, id: RecordId) -> Option<&Record> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Record shown at a visible row.
    pub fn record_at(&self, row: usize) -> Option<&Record> {
        self.view.data_row_at(row).and_then(|d| self.records.get(d))
    }

    pub fn view(&self) -> &RowView {
        &self.view
    }

    pub fn txlog(&self) -> &TxLog {
        &self.txlog
    }

    pub fn events(&self) -> &EventCollector {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<GridEvent> {
        self.events.drain()
    }

    /// Earliest timer deadline, if any.
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.scheduler.next_due()
    }

    pub fn is_scheduled(&self, task: TaskKind) -> bool {
        self.scheduler.is_scheduled(task)
    }

    /// Requests issued but not yet completed (including ones not taken).
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty() && self.outbox.is_empty()
    }

    /// Hand the queued store requests to the host.
    pub fn take_requests(&mut self) -> Vec<StoreRequest> {
        std::mem::take(&mut self.outbox)
    }

    pub fn window(&self, viewport: Viewport) -> VisibleWindow {
        visible_window(self.view.visible_count(), viewport, self.settings.row_height, self.settings.overscan)
    }

    pub fn snapshot(&self) -> GridSnapshot {
        let today = self.clock.today();
        let visible: Vec<&Record> = self
            .view
            .visible_data_rows()
            .iter()
            .filter_map(|&d| self.records.get(d))
            .collect();
        let groups = group_positions(&visible, &self.schema);

        let rows = visible
            .iter()
            .zip(groups)
            .map(|(r, group)| RowSnapshot {
                id: r.id,
                cells: self.schema.columns().map(|f| r.get(f.name).display()).collect(),
                empty: r.is_empty(&self.schema),
                group,
                tone: row_tone(r),
                butee: butee_hint(r.get("butee"), today),
            })
            .collect();

        GridSnapshot {
            kind: self.schema.kind(),
            columns: self.schema.columns().map(|f| f.name).collect(),
            rows,
            total_non_empty: self.view.total_non_empty(),
            visible_non_empty: self.view.visible_non_empty(),
            is_filtered: self.view.is_filtered(),
            selection: self.selection.snapshot(),
            pending_paste: self.pending_paste.clone(),
            supply_guard: self.supply_guard,
            batch_guard: self.batch_guard,
            in_flight: self.in_flight.len(),
        }
    }

    // -------------------------------------------------------------------------
    // Store cycle
    // -------------------------------------------------------------------------

    /// Request the initial snapshot.
    pub fn load(&mut self) -> GridSnapshot {
        self.request_refetch();
        self.snapshot()
    }

    /// Replace the local snapshot directly (hosts that fetch on their own).
    pub fn apply_snapshot(&mut self, records: Vec<Record>) -> GridSnapshot {
        self.apply_fetched(records);
        self.snapshot()
    }

    pub fn complete(&mut self, id: RequestId, outcome: Outcome) -> GridSnapshot {
        let Some(flight) = self.in_flight.remove(&id) else {
            log::warn!("completion for unknown request {:?} ignored", id);
            return self.snapshot();
        };

        match outcome {
            Outcome::Failed(err) => self.on_failure(&flight, err),
            Outcome::Fetched(records) => self.apply_fetched(records),
            Outcome::Created(record) => self.on_created(&flight, vec![record]),
            Outcome::CreatedBatch(records) => self.on_created(&flight, records),
            Outcome::Updated(record) => {
                self.commit(&flight);
                self.refresh_stored(vec![record]);
            }
            Outcome::UpdatedBatch(records) => {
                self.commit(&flight);
                self.refresh_stored(records);
            }
            Outcome::Deleted(_) | Outcome::Reordered => self.commit(&flight),
        }

        if let Some(guard) = flight.guard {
            self.settle_guard(guard);
        }
        if flight.refetch {
            self.request_refetch();
        }
        self.snapshot()
    }

    /// Run timers that are due.
    pub fn tick(&mut self) -> GridSnapshot {
        let now = self.clock.now();
        for task in self.scheduler.take_due(now) {
            match task {
                TaskKind::ReassertRowFloor => self.reassert_row_floor(),
                TaskKind::ReleaseSupplyGuard => {
                    log::debug!("supply guard released");
                    self.supply_guard = false;
                }
                TaskKind::ReleaseBatchGuard => {
                    log::debug!("batch guard released");
                    self.batch_guard = false;
                }
            }
        }
        self.snapshot()
    }

    /// Check the empty-row floor now instead of waiting for the debounce.
    pub fn reassert_row_floor_now(&mut self) -> GridSnapshot {
        self.scheduler.cancel(TaskKind::ReassertRowFloor);
        self.reassert_row_floor();
        self.snapshot()
    }

    // -------------------------------------------------------------------------
    // Pointer and keyboard
    // -------------------------------------------------------------------------

    pub fn mouse_down(&mut self, row: usize, col: usize) -> GridSnapshot {
        self.selection.mouse_down(row, col);
        self.snapshot()
    }

    pub fn mouse_enter(&mut self, row: usize, col: usize) -> GridSnapshot {
        if self.selection.is_filling() {
            self.selection.fill_handle_mouse_enter(row, col);
        } else {
            self.selection.mouse_enter(row, col);
        }
        self.snapshot()
    }

    /// Global mouse release. Commits a fill whose target advanced.
    pub fn mouse_up(&mut self) -> GridSnapshot {
        if let Some(fill) = self.selection.mouse_up() {
            self.commit_fill(fill);
        }
        self.snapshot()
    }

    pub fn fill_handle_mouse_down(&mut self) -> GridSnapshot {
        self.selection.fill_handle_mouse_down();
        self.snapshot()
    }

    pub fn select(&mut self, range: Range) -> GridSnapshot {
        self.selection.mouse_down(range.start_row, range.start_col);
        self.selection.mouse_enter(range.end_row, range.end_col);
        self.selection.mouse_up();
        self.snapshot()
    }

    pub fn key(&mut self, command: KeyCommand) -> GridSnapshot {
        match command {
            KeyCommand::Copy => self.copy(),
            KeyCommand::Paste => self.paste(),
            KeyCommand::Delete => self.clear_selection_cells(),
            KeyCommand::ExtendToEdge(direction) => {
                let rows = self.view.visible_count();
                let cols = self.schema.column_count();
                self.selection.extend_to_edge(direction, rows, cols);
                self.snapshot()
            }
            KeyCommand::Escape => {
                self.selection.clear();
                self.snapshot()
            }
        }
    }

    // -------------------------------------------------------------------------
    // Clipboard
    // -------------------------------------------------------------------------

    /// Text for a rectangle of visible cells, as written by copy.
    pub fn copy_text(&self, range: Range) -> String {
        let rows: Vec<Vec<String>> = (range.start_row..=range.end_row)
            .filter_map(|row| self.record_at(row))
            .map(|r| {
                (range.start_col..=range.end_col)
                    .filter_map(|col| self.schema.column(col))
                    .map(|f| r.get(f.name).display())
                    .collect()
            })
            .collect();
        clipboard::serialize(rows)
    }

    pub fn copy(&mut self) -> GridSnapshot {
        if let Some(range) = self.selection.range() {
            let text = self.copy_text(range);
            if let Err(e) = self.clipboard.write(&text) {
                self.notice(TITLE_CLIPBOARD, e.to_string());
            }
        }
        self.snapshot()
    }

    /// Paste the clipboard at the selection's top-left cell.
    pub fn paste(&mut self) -> GridSnapshot {
        let Some(range) = self.selection.range() else {
            return self.snapshot();
        };
        match self.clipboard.read() {
            Ok(text) => self.paste_text(range.start(), &text),
            Err(e) => {
                self.notice(TITLE_CLIPBOARD, e.to_string());
                self.snapshot()
            }
        }
    }

    /// Paste tab-delimited text with its top-left cell at `at`. When the
    /// grid is too short the paste waits for the missing rows.
    pub fn paste_text(&mut self, at: Coord, text: &str) -> GridSnapshot {
        let rows = clipboard::parse(text);
        if rows.is_empty() {
            return self.snapshot();
        }

        let needed = at.row + rows.len();
        let have = self.view.visible_count();
        if needed <= have && self.targets_ready(at.row, rows.len()) {
            self.apply_paste(at, rows);
            return self.snapshot();
        }

        let gap = needed.saturating_sub(have);
        log::debug!("paste of {} rows at {:?} waits for {} new rows", rows.len(), at, gap);
        self.pending_paste = Some(PendingPaste { at, rows });
        if gap > 0 {
            self.begin_batch();
            self.request_rows(gap);
        }
        self.records_changed();
        self.snapshot()
    }

    fn targets_ready(&self, start: usize, len: usize) -> bool {
        (start..start + len).all(|row| self.record_at(row).is_some_and(|r| !r.id.is_pending()))
    }

    fn try_pending_paste(&mut self) {
        let ready = match &self.pending_paste {
            Some(p) => self.targets_ready(p.at.row, p.rows.len()),
            None => false,
        };
        if !ready {
            return;
        }
        if let Some(paste) = self.pending_paste.take() {
            let rows = paste.rows.len();
            self.apply_paste(paste.at, paste.rows);
            self.events.push(GridEvent::PasteApplied { rows });
        }
    }

    fn apply_paste(&mut self, at: Coord, rows: Vec<Vec<String>>) {
        let mut edits = Vec::new();
        for (i, cells) in rows.iter().enumerate() {
            let Some(id) = self.record_at(at.row + i).map(|r| r.id) else {
                continue;
            };
            for (j, text) in cells.iter().enumerate() {
                let Some(field) = self.schema.column(at.col + j) else {
                    continue;
                };
                edits.push(CellEdit::new(id, field.name, pasted_value(field, text)));
            }
        }
        self.update_batch(edits);
    }

    fn clear_selection_cells(&mut self) -> GridSnapshot {
        let Some(range) = self.selection.range() else {
            return self.snapshot();
        };
        let mut edits = Vec::new();
        for row in range.start_row..=range.end_row {
            let Some(id) = self.record_at(row).map(|r| r.id) else {
                continue;
            };
            for col in range.start_col..=range.end_col {
                if let Some(field) = self.schema.column(col) {
                    edits.push(CellEdit::new(id, field.name, ""));
                }
            }
        }
        if edits.is_empty() {
            return self.snapshot();
        }
        self.update_batch(edits)
    }

    fn commit_fill(&mut self, fill: FillRange) {
        let mut edits = Vec::new();
        for step in fill.plan() {
            let (Some(target), Some(source)) = (self.record_at(step.target_row), self.record_at(step.source_row))
            else {
                continue;
            };
            for col in fill.columns() {
                if let Some(field) = self.schema.column(col) {
                    edits.push(CellEdit::new(target.id, field.name, source.get(field.name).clone()));
                }
            }
        }
        if !edits.is_empty() {
            log::debug!("fill {:?} -> row {}: {} cells", fill.source, fill.target_end.row, edits.len());
            self.update_batch(edits);
        }
    }

    // -------------------------------------------------------------------------
    // Edits
    // -------------------------------------------------------------------------

    pub fn update_cell(&mut self, id: RecordId, field: &str, value: impl Into<FieldValue>) -> GridSnapshot {
        let edit = CellEdit::new(id, field, value);
        let plan = match plan_cell(&self.records, &self.schema, &edit, self.delete_floor()) {
            Ok(plan) => plan,
            Err(e) => {
                self.reject(e);
                return self.snapshot();
            }
        };

        match plan {
            CellPlan::Update(stored, fields) => {
                let tx = self.begin_tx("update cell", &[id]);
                self.apply_local(id, &fields);
                self.issue(StoreOp::Update { id: stored, fields }, InFlight::new(TITLE_UPDATE_FAILED).with_tx(tx));
            }
            CellPlan::Delete(stored) => {
                let tx = self.begin_tx("delete emptied row", &[id]);
                self.remove_local(id);
                self.issue(
                    StoreOp::Delete { id: stored },
                    InFlight::new(TITLE_DELETE_FAILED).with_tx(tx).refetching(),
                );
            }
            CellPlan::Deferred(patch) => {
                self.apply_local(patch.id, &patch.fields);
                self.deferred.push(patch);
            }
            CellPlan::Skip => return self.snapshot(),
        }
        self.records_changed();
        self.snapshot()
    }

    /// Apply many cell edits as one operation: one bulk update plus one
    /// bulk delete at most.
    pub fn update_batch(&mut self, edits: Vec<CellEdit>) -> GridSnapshot {
        self.begin_batch();
        match plan_batch(&self.records, &self.schema, &edits, self.delete_floor()) {
            Ok(plan) => self.dispatch_batch(plan),
            Err(e) => self.reject(e),
        }
        self.snapshot()
    }

    /// Set the entry date and derive the week label in the same batch.
    pub fn set_entry_date(&mut self, id: RecordId, entry: NaiveDateTime) -> GridSnapshot {
        let week = week_label(entry.date(), self.clock.today());
        self.update_batch(vec![
            CellEdit::new(id, "entree", entry),
            CellEdit::new(id, "semaine", week),
        ])
    }

    fn dispatch_batch(&mut self, plan: BatchPlan) {
        let mut issued = false;

        if !plan.updates.is_empty() {
            let ids: Vec<RecordId> = plan.updates.iter().map(|(id, _)| RecordId::Stored(*id)).collect();
            let tx = self.begin_tx("update batch", &ids);
            for (id, fields) in &plan.updates {
                self.apply_local(RecordId::Stored(*id), fields);
            }
            self.issue(
                StoreOp::UpdateBatch { updates: plan.updates },
                InFlight::new(TITLE_UPDATE_FAILED).with_tx(tx).guarded(Guard::Batch).refetching(),
            );
            issued = true;
        }

        if !plan.deletes.is_empty() {
            let ids: Vec<RecordId> = plan.deletes.iter().map(|id| RecordId::Stored(*id)).collect();
            let tx = self.begin_tx("delete emptied rows", &ids);
            for id in &ids {
                self.remove_local(*id);
            }
            self.issue(
                StoreOp::DeleteBatch { ids: plan.deletes },
                InFlight::new(TITLE_DELETE_FAILED).with_tx(tx).guarded(Guard::Batch).refetching(),
            );
            issued = true;
        }

        for patch in plan.deferred {
            self.apply_local(patch.id, &patch.fields);
            self.deferred.push(patch);
        }

        if !issued {
            self.release_batch_guard_when_idle();
        }
        self.records_changed();
    }

    fn reject(&mut self, err: GridError) {
        let title = match err {
            GridError::Validation { .. } => TITLE_DATE_VALIDATION,
            _ => TITLE_UPDATE_FAILED,
        };
        self.notice(title, err.to_string());
        self.release_batch_guard_when_idle();
    }

    // -------------------------------------------------------------------------
    // Rows
    // -------------------------------------------------------------------------

    /// Add blank rows optimistically; they show as pending until created.
    pub fn add_rows(&mut self, count: usize) -> GridSnapshot {
        if count > 0 {
            self.begin_batch();
            self.request_rows(count);
            self.records_changed();
        }
        self.snapshot()
    }

    pub fn delete_row(&mut self, id: RecordId) -> GridSnapshot {
        let Some(stored) = id.stored() else {
            log::debug!("delete of pending row {} ignored", id);
            return self.snapshot();
        };
        if self.record(id).is_none() {
            return self.snapshot();
        }
        let tx = self.begin_tx("delete row", &[id]);
        self.remove_local(id);
        self.issue(
            StoreOp::Delete { id: stored },
            InFlight::new(TITLE_DELETE_FAILED).with_tx(tx).refetching(),
        );
        self.records_changed();
        self.snapshot()
    }

    /// Copy a row; the copy appears after the refetch.
    pub fn duplicate_row(&mut self, id: RecordId) -> GridSnapshot {
        match id.stored() {
            Some(stored) if self.record(id).is_some() => {
                self.issue(StoreOp::Duplicate { id: stored }, InFlight::new(TITLE_CREATE_FAILED).refetching());
            }
            _ => log::debug!("duplicate of {} ignored", id),
        }
        self.snapshot()
    }

    /// Put the given rows in this order, reusing the order slots they
    /// already occupy. Only rows whose slot changes are sent.
    pub fn reorder(&mut self, ids: &[RecordId]) -> GridSnapshot {
        let Some(order) = self.schema.order_field() else {
            log::debug!("{} rows have no manual order", self.schema.kind());
            return self.snapshot();
        };
        if ids.iter().any(|id| id.is_pending() || self.record(*id).is_none()) {
            log::debug!("reorder skipped: unknown or pending rows");
            return self.snapshot();
        }

        let current = |this: &Self, id: RecordId| {
            this.record(id).and_then(|r| r.get(order.name).as_integer())
        };
        let mut slots: Vec<i64> = ids.iter().filter_map(|id| current(self, *id)).collect();
        slots.sort_unstable();
        slots.dedup();
        if slots.len() != ids.len() {
            slots = (1..=ids.len() as i64).collect();
        }

        let changes: Vec<(RecordId, i64)> = ids
            .iter()
            .zip(&slots)
            .filter(|(id, slot)| current(self, **id) != Some(**slot))
            .map(|(id, slot)| (*id, *slot))
            .collect();
        if changes.is_empty() {
            return self.snapshot();
        }

        let touched: Vec<RecordId> = changes.iter().map(|(id, _)| *id).collect();
        let tx = self.begin_tx("reorder", &touched);
        let mut orders = Vec::with_capacity(changes.len());
        for (id, slot) in changes {
            let patch: FieldMap = [(order.name.to_string(), FieldValue::Integer(slot))].into();
            self.apply_local(id, &patch);
            if let Some(stored) = id.stored() {
                orders.push((stored, slot));
            }
        }
        self.issue(
            StoreOp::Reorder { orders },
            InFlight::new(TITLE_UPDATE_FAILED).with_tx(tx).refetching(),
        );
        self.records_changed();
        self.snapshot()
    }

    /// Drag a visible row to another visible position.
    pub fn move_row(&mut self, from: usize, to: usize) -> GridSnapshot {
        let mut ids: Vec<RecordId> = self
            .view
            .visible_data_rows()
            .iter()
            .filter_map(|&d| self.records.get(d).map(|r| r.id))
            .collect();
        if from >= ids.len() || to >= ids.len() || from == to {
            return self.snapshot();
        }
        let moved = ids.remove(from);
        ids.insert(to, moved);
        self.reorder(&ids)
    }

    // -------------------------------------------------------------------------
    // Filters
    // -------------------------------------------------------------------------

    pub fn set_global_filter(&mut self, text: &str) -> GridSnapshot {
        self.filters.set_global(text);
        self.rebuild_view();
        self.snapshot()
    }

    pub fn set_column_filter(&mut self, field: &str, values: Vec<String>) -> GridSnapshot {
        self.filters.set_column(field, values);
        self.rebuild_view();
        self.snapshot()
    }

    pub fn clear_filters(&mut self) -> GridSnapshot {
        self.filters.clear();
        self.rebuild_view();
        self.snapshot()
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    /// Floor used when deciding whether an emptied row is deleted. Only
    /// the maintenance grid recycles blank rows.
    fn delete_floor(&self) -> usize {
        if self.schema.has_row_supply() {
            self.settings.empty_floor
        } else {
            usize::MAX
        }
    }

    fn rebuild_view(&mut self) {
        self.view = RowView::build(&self.records, &self.schema, &self.filters);
    }

    /// Snapshot changed: re-derive the view, push back the floor check,
    /// and see whether a waiting paste can land.
    fn records_changed(&mut self) {
        self.rebuild_view();
        if self.schema.has_row_supply() {
            let now = self.clock.now();
            self.scheduler.schedule_in(TaskKind::ReassertRowFloor, now, self.settings.debounce_ms);
        }
        self.try_pending_paste();
    }

    fn issue(&mut self, op: StoreOp, flight: InFlight) -> RequestId {
        self.next_request += 1;
        let id = RequestId(self.next_request);
        match flight.guard {
            Some(Guard::Supply) => {
                self.supply_guard = true;
                self.scheduler.cancel(TaskKind::ReleaseSupplyGuard);
            }
            Some(Guard::Batch) => self.begin_batch(),
            None => {}
        }
        log::debug!("request {:?}: {}", id, op.name());
        self.in_flight.insert(id, flight);
        self.outbox.push(StoreRequest { id, op });
        id
    }

    fn request_refetch(&mut self) {
        let queued = self.outbox.iter().any(|r| r.op == StoreOp::FetchAll);
        if !queued {
            self.issue(StoreOp::FetchAll, InFlight::new(TITLE_UPDATE_FAILED));
        }
    }

    fn begin_batch(&mut self) {
        self.batch_guard = true;
        self.scheduler.cancel(TaskKind::ReleaseBatchGuard);
    }

    /// Nothing was sent for this batch; let the guard go after a short delay.
    fn release_batch_guard_when_idle(&mut self) {
        if self.guard_busy(Guard::Batch) {
            return;
        }
        let now = self.clock.now();
        self.scheduler
            .schedule_in(TaskKind::ReleaseBatchGuard, now, self.settings.batch_idle_release_ms);
    }

    fn guard_busy(&self, guard: Guard) -> bool {
        self.in_flight.values().any(|f| f.guard == Some(guard))
    }

    fn settle_guard(&mut self, guard: Guard) {
        if self.guard_busy(guard) {
            return;
        }
        let now = self.clock.now();
        match guard {
            Guard::Supply => {
                self.scheduler
                    .schedule_in(TaskKind::ReleaseSupplyGuard, now, self.settings.cooldown_ms)
            }
            Guard::Batch => {
                self.scheduler
                    .schedule_in(TaskKind::ReleaseBatchGuard, now, self.settings.batch_release_ms)
            }
        }
    }

    fn reassert_row_floor(&mut self) {
        if !self.schema.has_row_supply() {
            return;
        }
        if self.supply_guard || self.batch_guard {
            log::debug!(
                "row floor check dropped (supply guard {}, batch guard {})",
                self.supply_guard,
                self.batch_guard
            );
            return;
        }

        let now = self.clock.now();
        match plan_supply(&self.records, &self.schema, self.settings.empty_floor, now, self.settings.grace_ms) {
            SupplyPlan::Steady => {}
            SupplyPlan::TooYoung => log::debug!("excess empty rows are all inside the grace window"),
            SupplyPlan::Create(count) => {
                log::debug!("row floor: creating {} blank rows", count);
                let blank = blank_fields(&self.schema);
                for _ in 0..count {
                    self.issue(
                        StoreOp::Create { fields: blank.clone() },
                        InFlight::new(TITLE_CREATE_FAILED).guarded(Guard::Supply).refetching(),
                    );
                }
            }
            SupplyPlan::Delete(ids) => {
                log::debug!("row floor: deleting {} excess blank rows", ids.len());
                self.issue(
                    StoreOp::DeleteBatch { ids },
                    InFlight::new(TITLE_DELETE_FAILED).guarded(Guard::Supply).refetching(),
                );
            }
        }
    }

    /// Insert optimistic placeholders and request their creation, in bulk
    /// chunks past the threshold.
    fn request_rows(&mut self, count: usize) {
        let now = self.clock.now();
        let blank = blank_fields(&self.schema);
        let mut pending = Vec::with_capacity(count);
        for _ in 0..count {
            self.next_pending += 1;
            let id = RecordId::Pending(self.next_pending);
            let mut record = Record::new(id, now);
            record.apply(&blank);
            self.records.push(record);
            pending.push(id);
        }

        if count > self.settings.bulk_threshold {
            for chunk in pending.chunks(self.settings.create_chunk.max(1)) {
                let tx = self.txlog.begin("create rows", chunk.iter().map(|id| (*id, None)).collect());
                self.issue(
                    StoreOp::CreateBatch { rows: vec![blank.clone(); chunk.len()] },
                    InFlight::new(TITLE_CREATE_FAILED)
                        .with_tx(tx)
                        .with_pending(chunk.to_vec())
                        .guarded(Guard::Batch)
                        .refetching(),
                );
            }
        } else {
            for id in pending {
                let tx = self.txlog.begin("create row", vec![(id, None)]);
                self.issue(
                    StoreOp::Create { fields: blank.clone() },
                    InFlight::new(TITLE_CREATE_FAILED)
                        .with_tx(tx)
                        .with_pending(vec![id])
                        .guarded(Guard::Batch)
                        .refetching(),
                );
            }
        }
    }

    fn begin_tx(&mut self, label: &str, ids: &[RecordId]) -> TxId {
        let pre_image = ids
            .iter()
            .map(|id| (*id, self.record(*id).cloned()))
            .collect();
        self.txlog.begin(label, pre_image)
    }

    fn commit(&mut self, flight: &InFlight) {
        if let Some(tx) = flight.tx {
            self.txlog.commit(tx);
        }
    }

    fn index_of(&self, id: RecordId) -> Option<usize> {
        self.records.iter().position(|r| r.id == id)
    }

    fn apply_local(&mut self, id: RecordId, fields: &FieldMap) {
        if let Some(i) = self.index_of(id) {
            self.records[i].apply(fields);
        }
    }

    fn remove_local(&mut self, id: RecordId) {
        self.records.retain(|r| r.id != id);
    }

    fn upsert(&mut self, record: Record) {
        match self.index_of(record.id) {
            Some(i) => self.records[i] = record,
            None => self.records.push(record),
        }
    }

    /// Take the store's copy of rows we still show.
    fn refresh_stored(&mut self, records: Vec<Record>) {
        for record in records {
            if let Some(i) = self.index_of(record.id) {
                self.records[i] = record;
            }
        }
        self.rebuild_view();
    }

    fn apply_fetched(&mut self, records: Vec<Record>) {
        // Placeholders whose create has not come back stay visible
        let awaiting: Vec<RecordId> = self.in_flight.values().flat_map(|f| f.pending.iter().copied()).collect();
        let kept: Vec<Record> = self
            .records
            .iter()
            .filter(|r| awaiting.contains(&r.id))
            .cloned()
            .collect();
        self.records = records;
        self.records.extend(kept);
        self.records_changed();
    }

    fn on_created(&mut self, flight: &InFlight, created: Vec<Record>) {
        self.commit(flight);
        if flight.pending.is_empty() {
            // Not optimistic; the refetch brings the row in
            return;
        }

        let mut stored_ids = Vec::with_capacity(created.len());
        let mut confirmed = Vec::with_capacity(created.len());
        let mut resend: Vec<(i64, FieldMap)> = Vec::new();
        for (pending, record) in flight.pending.iter().zip(created) {
            let stored_id = record.id;
            self.remove_local(*pending);
            self.upsert(record);
            self.txlog.rename(*pending, stored_id);

            let (mine, rest): (Vec<RowPatch>, Vec<RowPatch>) =
                std::mem::take(&mut self.deferred).into_iter().partition(|p| p.id == *pending);
            self.deferred = rest;
            if let Some(stored) = stored_id.stored() {
                let mut fields = FieldMap::new();
                for patch in mine {
                    fields.extend(patch.fields);
                }
                if !fields.is_empty() {
                    resend.push((stored, fields));
                }
            }
            confirmed.push(*pending);
            stored_ids.push(stored_id);
        }

        // The store returned fewer rows than asked for
        for pending in flight.pending.iter().skip(confirmed.len()) {
            self.remove_local(*pending);
            self.deferred.retain(|p| p.id != *pending);
        }

        self.events.push(GridEvent::RowsConfirmed { pending: confirmed, stored: stored_ids });

        if !resend.is_empty() {
            log::debug!("re-sending edits for {} confirmed rows", resend.len());
            let ids: Vec<RecordId> = resend.iter().map(|(id, _)| RecordId::Stored(*id)).collect();
            // Pre-image is the row as the store created it
            let tx = self.begin_tx("deferred edits", &ids);
            for (id, fields) in &resend {
                self.apply_local(RecordId::Stored(*id), fields);
            }
            self.issue(
                StoreOp::UpdateBatch { updates: resend },
                InFlight::new(TITLE_UPDATE_FAILED).with_tx(tx).guarded(Guard::Batch).refetching(),
            );
        }
        self.records_changed();
    }

    fn on_failure(&mut self, flight: &InFlight, err: StoreError) {
        log::error!("{}: {}", flight.title, err);

        if let Some(tx) = flight.tx {
            let pre_image = self.txlog.roll_back(tx);
            let rows: Vec<RecordId> = pre_image.iter().map(|(id, _)| *id).collect();
            for (id, record) in pre_image {
                match record {
                    Some(record) => self.upsert(record),
                    None => self.remove_local(id),
                }
            }
            self.events.push(GridEvent::RolledBack { tx, rows });
        }
        if !flight.pending.is_empty() {
            self.deferred.retain(|p| !flight.pending.contains(&p.id));
        }

        let message = match flight.guard {
            Some(Guard::Supply) => GridError::Invariant(err.to_string()).to_string(),
            _ => err.to_string(),
        };
        self.notice(flight.title, message);
        self.records_changed();
    }

    fn notice(&mut self, title: &str, message: String) {
        log::warn!("{}: {}", title, message);
        self.events.push(GridEvent::notice(title, message));
    }
}
