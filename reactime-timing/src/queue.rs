//! Cancellable delayed-event queue.
//!
//! The engine is single-threaded and cooperative: instead of spawning timer
//! callbacks it schedules events here and drains the due ones whenever the
//! host loop calls `advance(now)`. Cancelling an id guarantees the event is
//! never returned, which is what keeps stale phase transitions from firing.

use std::collections::BTreeMap;

/// Handle returned by [`TimerQueue::schedule`]. Ordered by deadline, then by
/// scheduling order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId {
    deadline_ms: u64,
    seq: u64,
}

impl TimerId {
    pub fn deadline_ms(&self) -> u64 {
        self.deadline_ms
    }
}

#[derive(Debug, Clone)]
pub struct TimerQueue<E> {
    pending: BTreeMap<TimerId, E>,
    next_seq: u64,
}

impl<E> Default for TimerQueue<E> {
    fn default() -> Self {
        Self {
            pending: BTreeMap::new(),
            next_seq: 0,
        }
    }
}

impl<E> TimerQueue<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, deadline_ms: u64, event: E) -> TimerId {
        let id = TimerId {
            deadline_ms,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.pending.insert(id, event);
        id
    }

    /// Returns the cancelled event, or `None` if it already fired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> Option<E> {
        self.pending.remove(&id)
    }

    pub fn cancel_all(&mut self) -> usize {
        let n = self.pending.len();
        self.pending.clear();
        n
    }

    /// Pops the earliest event whose deadline is `<= now_ms`.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<(TimerId, E)> {
        let (id, _) = self.pending.first_key_value()?;
        if id.deadline_ms > now_ms {
            return None;
        }
        self.pending.pop_first()
    }

    /// Pops the earliest event whose deadline is strictly before `now_ms`.
    /// Hosts drain with this ahead of an input stamped `now_ms`, so the input
    /// wins a tie with a deadline.
    pub fn pop_due_before(&mut self, now_ms: u64) -> Option<(TimerId, E)> {
        let (id, _) = self.pending.first_key_value()?;
        if id.deadline_ms >= now_ms {
            return None;
        }
        self.pending.pop_first()
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.pending.keys().next().map(|id| id.deadline_ms)
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.pending.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_deadline_order() {
        let mut q = TimerQueue::new();
        q.schedule(300, "c");
        q.schedule(100, "a");
        q.schedule(200, "b");

        assert_eq!(q.pop_due(50), None);
        assert_eq!(q.pop_due(250).map(|(_, e)| e), Some("a"));
        assert_eq!(q.pop_due(250).map(|(_, e)| e), Some("b"));
        assert_eq!(q.pop_due(250), None);
        assert_eq!(q.next_deadline(), Some(300));
    }

    #[test]
    fn equal_deadlines_keep_scheduling_order() {
        let mut q = TimerQueue::new();
        q.schedule(100, 1);
        q.schedule(100, 2);
        assert_eq!(q.pop_due(100).map(|(_, e)| e), Some(1));
        assert_eq!(q.pop_due(100).map(|(_, e)| e), Some(2));
    }

    #[test]
    fn pop_due_before_leaves_ties_pending() {
        let mut q = TimerQueue::new();
        q.schedule(100, "early");
        q.schedule(200, "tie");
        assert_eq!(q.pop_due_before(200).map(|(_, e)| e), Some("early"));
        assert_eq!(q.pop_due_before(200), None);
        assert_eq!(q.pop_due(200).map(|(_, e)| e), Some("tie"));
    }

    #[test]
    fn cancelled_events_never_fire() {
        let mut q = TimerQueue::new();
        let stale = q.schedule(100, "stale");
        q.schedule(150, "live");

        assert_eq!(q.cancel(stale), Some("stale"));
        assert_eq!(q.cancel(stale), None);
        assert!(!q.is_pending(stale));
        assert_eq!(q.pop_due(1_000).map(|(_, e)| e), Some("live"));
        assert!(q.is_empty());
    }

    #[test]
    fn cancel_all_clears_everything() {
        let mut q = TimerQueue::new();
        q.schedule(10, ());
        q.schedule(20, ());
        assert_eq!(q.cancel_all(), 2);
        assert_eq!(q.next_deadline(), None);
        assert_eq!(q.pop_due(u64::MAX), None);
    }
}
