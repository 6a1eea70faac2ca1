use crate::domain::entities::QueueEntry;
use chrono::{DateTime, Utc};

/// Stable priority queue of waiting calls.
///
/// Ordering is priority descending, then arrival ascending (FIFO within a
/// priority band). Stability is guaranteed by a monotonic sequence number
/// rather than timestamp comparison, so two calls admitted in the same
/// millisecond still keep their arrival order. Positions are recomputed to a
/// contiguous 1..N after every mutation.
pub struct CallQueue {
    slots: Vec<Slot>,
    next_seq: u64,
    service_time_secs: i64,
    max_size: Option<usize>,
}

struct Slot {
    seq: u64,
    entry: QueueEntry,
}

impl CallQueue {
    /// `service_time_secs` is the average-handle-time estimate used for wait
    /// projections; `max_size` of None means unbounded.
    pub fn new(service_time_secs: i64, max_size: Option<usize>) -> Self {
        Self {
            slots: Vec::new(),
            next_seq: 0,
            service_time_secs,
            max_size,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        match self.max_size {
            Some(max) => self.slots.len() >= max,
            None => false,
        }
    }

    pub fn contains(&self, call_id: &str) -> bool {
        self.slots.iter().any(|s| s.entry.call_id == call_id)
    }

    /// Admit a call. Priority is clamped to the 1..=5 band. The new entry
    /// lands after every queued call of the same or higher priority; its
    /// estimated wait is `position * service_time_secs`. Estimates of entries
    /// it displaces are left as they were.
    pub fn enqueue(
        &mut self,
        call_id: String,
        caller_number: String,
        priority: i32,
        now: DateTime<Utc>,
    ) -> QueueEntry {
        let priority = priority.clamp(1, 5);
        let seq = self.next_seq;
        self.next_seq += 1;

        let insert_at = self
            .slots
            .iter()
            .position(|s| s.entry.priority < priority)
            .unwrap_or(self.slots.len());

        self.slots.insert(
            insert_at,
            Slot {
                seq,
                entry: QueueEntry {
                    call_id,
                    caller_number,
                    priority,
                    position: 0,
                    estimated_wait_secs: 0,
                    queued_at: now,
                },
            },
        );
        self.recompact_positions();

        let position = (insert_at + 1) as i64;
        self.slots[insert_at].entry.estimated_wait_secs = position * self.service_time_secs;
        self.slots[insert_at].entry.clone()
    }

    /// Remove and return the head (position 1). Survivors move up one
    /// position and their wait estimates drop by one service-time unit,
    /// floored at zero.
    pub fn dequeue_head(&mut self) -> Option<QueueEntry> {
        if self.slots.is_empty() {
            return None;
        }
        let head = self.slots.remove(0);
        for slot in &mut self.slots {
            slot.entry.estimated_wait_secs =
                (slot.entry.estimated_wait_secs - self.service_time_secs).max(0);
        }
        self.recompact_positions();
        Some(head.entry)
    }

    /// Remove a specific call (abandon or out-of-band cancel). Positions
    /// recompact; estimates are untouched.
    pub fn remove(&mut self, call_id: &str) -> Option<QueueEntry> {
        let idx = self.slots.iter().position(|s| s.entry.call_id == call_id)?;
        let removed = self.slots.remove(idx);
        self.recompact_positions();
        Some(removed.entry)
    }

    /// Ordered read-only copy for dashboards and status queries.
    pub fn snapshot(&self) -> Vec<QueueEntry> {
        self.slots.iter().map(|s| s.entry.clone()).collect()
    }

    fn recompact_positions(&mut self) {
        // Sort defensively; insertion keeps order, but recompaction is the
        // single place the 1..N invariant is re-established.
        self.slots
            .sort_by(|a, b| b.entry.priority.cmp(&a.entry.priority).then(a.seq.cmp(&b.seq)));
        for (i, slot) in self.slots.iter_mut().enumerate() {
            slot.entry.position = (i + 1) as i64;
        }
    }
}
