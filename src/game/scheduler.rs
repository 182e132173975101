//! Single-threaded task scheduler driven by the session clock
//!
//! Countdown ticks and phase transitions are plain entries in a table rather
//! than detached callbacks, so leaving a round cancels all of them at once.

use std::collections::BTreeMap;

/// Work the round machine asks to be woken up for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// One-second intermission tick
    CountdownTick,
    /// Hazard duration elapsed
    HazardEnd,
    /// Round-end delay elapsed
    RoundReset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledTask {
    pub id: TaskId,
    pub kind: TaskKind,
    pub due_ms: u64,
}

#[derive(Debug, Clone)]
struct Entry {
    kind: TaskKind,
    due_ms: u64,
    repeat_ms: Option<u64>,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    tasks: BTreeMap<TaskId, Entry>,
    next_id: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule_once(&mut self, now_ms: u64, delay_ms: u64, kind: TaskKind) -> TaskId {
        self.insert(kind, now_ms + delay_ms, None)
    }

    /// First run after `interval_ms`, then every `interval_ms`
    pub fn schedule_repeating(&mut self, now_ms: u64, interval_ms: u64, kind: TaskKind) -> TaskId {
        let interval_ms = interval_ms.max(1);
        self.insert(kind, now_ms + interval_ms, Some(interval_ms))
    }

    /// Returns false when the task already fired or was cancelled
    pub fn cancel(&mut self, id: TaskId) -> bool {
        self.tasks.remove(&id).is_some()
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn is_pending(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    /// Pop the earliest task due at or before `now_ms`.
    ///
    /// Repeating tasks are re-armed before being returned, so a caller that
    /// cancels from inside the handler removes the re-armed entry. Calling in
    /// a loop catches up on every missed repetition in due order.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<ScheduledTask> {
        let (id, due_ms) = self
            .tasks
            .iter()
            .filter(|(_, e)| e.due_ms <= now_ms)
            .min_by_key(|(id, e)| (e.due_ms, **id))
            .map(|(id, e)| (*id, e.due_ms))?;

        let entry = self.tasks.get_mut(&id)?;
        let kind = entry.kind;
        match entry.repeat_ms {
            Some(interval) => entry.due_ms += interval,
            None => {
                self.tasks.remove(&id);
            }
        }

        Some(ScheduledTask { id, kind, due_ms })
    }

    fn insert(&mut self, kind: TaskKind, due_ms: u64, repeat_ms: Option<u64>) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.tasks.insert(
            id,
            Entry {
                kind,
                due_ms,
                repeat_ms,
            },
        );
        id
    }
}
