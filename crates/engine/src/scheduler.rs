//! Named, cancellable timers driven by an injected clock.
//!
//! Scheduling a kind that is already pending replaces it, which is how the
//! row-floor debounce and guard cool-downs are expressed.

use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Re-check the empty-row floor.
    ReassertRowFloor,
    ReleaseSupplyGuard,
    ReleaseBatchGuard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Task {
    kind: TaskKind,
    due: DateTime<Utc>,
    seq: u64,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    tasks: Vec<Task>,
    seq: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `kind` at `due`, superseding any pending task of that kind.
    pub fn schedule(&mut self, kind: TaskKind, due: DateTime<Utc>) {
        self.cancel(kind);
        self.seq += 1;
        log::debug!("schedule {:?} at {}", kind, due);
        self.tasks.push(Task { kind, due, seq: self.seq });
    }

    pub fn schedule_in(&mut self, kind: TaskKind, now: DateTime<Utc>, delay_ms: u64) {
        self.schedule(kind, now + Duration::milliseconds(delay_ms as i64));
    }

    pub fn cancel(&mut self, kind: TaskKind) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.kind != kind);
        before != self.tasks.len()
    }

    pub fn is_scheduled(&self, kind: TaskKind) -> bool {
        self.tasks.iter().any(|t| t.kind == kind)
    }

    /// Earliest pending deadline, for hosts that sleep until the next tick.
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.tasks.iter().map(|t| t.due).min()
    }

    /// Remove and return every task due at or before `now`, earliest first.
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Vec<TaskKind> {
        let (mut due, pending): (Vec<Task>, Vec<Task>) =
            self.tasks.drain(..).partition(|t| t.due <= now);
        self.tasks = pending;
        due.sort_by_key(|t| (t.due, t.seq));
        due.into_iter().map(|t| t.kind).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_reschedule_supersedes() {
        let mut s = Scheduler::new();
        s.schedule_in(TaskKind::ReassertRowFloor, t0(), 1_000);
        s.schedule_in(TaskKind::ReassertRowFloor, t0() + Duration::milliseconds(600), 1_000);

        assert!(s.take_due(t0() + Duration::milliseconds(1_000)).is_empty());
        assert_eq!(
            s.take_due(t0() + Duration::milliseconds(1_600)),
            vec![TaskKind::ReassertRowFloor]
        );
        assert!(s.is_empty());
    }

    #[test]
    fn test_due_tasks_in_deadline_order() {
        let mut s = Scheduler::new();
        s.schedule_in(TaskKind::ReleaseBatchGuard, t0(), 1_000);
        s.schedule_in(TaskKind::ReleaseSupplyGuard, t0(), 100);
        s.schedule_in(TaskKind::ReassertRowFloor, t0(), 5_000);
        assert_eq!(s.next_due(), Some(t0() + Duration::milliseconds(100)));

        let due = s.take_due(t0() + Duration::milliseconds(2_000));
        assert_eq!(due, vec![TaskKind::ReleaseSupplyGuard, TaskKind::ReleaseBatchGuard]);
        assert!(s.is_scheduled(TaskKind::ReassertRowFloor));
    }

    #[test]
    fn test_cancel() {
        let mut s = Scheduler::new();
        s.schedule(TaskKind::ReleaseBatchGuard, t0());
        assert!(s.cancel(TaskKind::ReleaseBatchGuard));
        assert!(!s.cancel(TaskKind::ReleaseBatchGuard));
        assert!(s.take_due(t0()).is_empty());
    }
}
