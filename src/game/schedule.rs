//! Deferred world actions keyed by simulation time.
//!
//! Bot and virus respawns are pushed here with a deadline and drained at the
//! start of the first tick whose clock has reached it.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::game::state::OwnerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduledEvent {
    /// Give a bot with no living cells a fresh primary
    RespawnBot(OwnerId),
    /// Place a new (growing) virus somewhere in the arena
    SpawnVirus,
}

#[derive(Debug, Clone)]
struct Entry {
    due_ms: f64,
    seq: u64,
    event: ScheduledEvent,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Reversed so the max-heap pops the earliest deadline, FIFO among equals
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due_ms
            .total_cmp(&self.due_ms)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Min-heap of events ordered by deadline, then insertion order
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    queue: BinaryHeap<Entry>,
    next_seq: u64,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, due_ms: f64, event: ScheduledEvent) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Entry { due_ms, seq, event });
    }

    /// Remove and return every event due at or before `now_ms`, earliest first
    pub fn drain_due(&mut self, now_ms: f64) -> Vec<ScheduledEvent> {
        let mut due = Vec::new();
        while self.queue.peek().is_some_and(|e| e.due_ms <= now_ms) {
            if let Some(entry) = self.queue.pop() {
                due.push(entry.event);
            }
        }
        due
    }

    /// Number of pending events matching `pred`
    pub fn count_pending(&self, pred: impl Fn(&ScheduledEvent) -> bool) -> usize {
        self.queue.iter().filter(|e| pred(&e.event)).count()
    }

    /// Drop pending events matching `pred` (e.g. respawns for a removed bot)
    pub fn cancel(&mut self, pred: impl Fn(&ScheduledEvent) -> bool) {
        self.queue.retain(|e| !pred(&e.event));
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
