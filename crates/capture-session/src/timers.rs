//! Logical timers
//!
//! Min-heap of due times in milliseconds of session clock. Each kind has at
//! most one pending deadline; scheduling a kind again replaces it and
//! cancelled entries are skipped lazily when popped.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use serde::{Deserialize, Serialize};

/// Timers owned by the session controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimerKind {
    /// Per-second recording countdown
    SegmentTick,
    /// Resume after face loss or a quality problem
    RestartDelay,
    /// Re-record a segment that stopped short
    Retry,
    /// Move on to the next segment
    Advance,
    /// Challenge pose sampler
    ChallengeSample,
    /// Hard limit on a challenge attempt
    ChallengeTimeout,
}

#[derive(Debug, Clone)]
struct Deadline {
    due_ms: u64,
    seq: u64,
    kind: TimerKind,
}

impl Eq for Deadline {}

impl PartialEq for Deadline {
    fn eq(&self, other: &Self) -> bool {
        self.due_ms == other.due_ms && self.seq == other.seq
    }
}

impl Ord for Deadline {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap behavior; ties fire in scheduling order
        other
            .due_ms
            .cmp(&self.due_ms)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Pending logical timers
#[derive(Debug, Default)]
pub struct TimerQueue {
    heap: BinaryHeap<Deadline>,
    live: HashMap<TimerKind, u64>,
    seq: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `kind` to fire at `due_ms`, replacing any pending deadline
    pub fn schedule(&mut self, kind: TimerKind, due_ms: u64) {
        self.seq += 1;
        self.live.insert(kind, self.seq);
        self.heap.push(Deadline {
            due_ms,
            seq: self.seq,
            kind,
        });
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        self.live.remove(&kind);
    }

    pub fn cancel_all(&mut self) {
        self.live.clear();
        self.heap.clear();
    }

    pub fn is_scheduled(&self, kind: TimerKind) -> bool {
        self.live.contains_key(&kind)
    }

    /// Remove and return the earliest live timer due at `now_ms`
    pub fn pop_due(&mut self, now_ms: u64) -> Option<TimerKind> {
        while let Some(top) = self.heap.peek() {
            if top.due_ms > now_ms {
                return None;
            }
            let deadline = self.heap.pop()?;
            if self.live.get(&deadline.kind) == Some(&deadline.seq) {
                self.live.remove(&deadline.kind);
                return Some(deadline.kind);
            }
        }
        None
    }

    /// Earliest live deadline
    pub fn next_due(&self) -> Option<u64> {
        self.heap
            .iter()
            .filter(|d| self.live.get(&d.kind) == Some(&d.seq))
            .map(|d| d.due_ms)
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_in_due_order() {
        let mut timers = TimerQueue::new();
        timers.schedule(TimerKind::Advance, 500);
        timers.schedule(TimerKind::SegmentTick, 100);
        timers.schedule(TimerKind::Retry, 300);

        assert_eq!(timers.pop_due(50), None);
        assert_eq!(timers.pop_due(400), Some(TimerKind::SegmentTick));
        assert_eq!(timers.pop_due(400), Some(TimerKind::Retry));
        assert_eq!(timers.pop_due(400), None);
        assert_eq!(timers.next_due(), Some(500));
    }

    #[test]
    fn test_reschedule_replaces() {
        let mut timers = TimerQueue::new();
        timers.schedule(TimerKind::SegmentTick, 100);
        timers.schedule(TimerKind::SegmentTick, 1_000);

        assert_eq!(timers.pop_due(500), None);
        assert_eq!(timers.pop_due(1_000), Some(TimerKind::SegmentTick));
        assert!(!timers.is_scheduled(TimerKind::SegmentTick));
    }

    #[test]
    fn test_cancel() {
        let mut timers = TimerQueue::new();
        timers.schedule(TimerKind::RestartDelay, 100);
        timers.schedule(TimerKind::ChallengeTimeout, 100);
        timers.cancel(TimerKind::RestartDelay);

        assert_eq!(timers.pop_due(100), Some(TimerKind::ChallengeTimeout));
        assert_eq!(timers.pop_due(100), None);
        assert_eq!(timers.next_due(), None);
    }

    #[test]
    fn test_cancel_inside_batch_is_respected() {
        let mut timers = TimerQueue::new();
        timers.schedule(TimerKind::ChallengeSample, 100);
        timers.schedule(TimerKind::ChallengeTimeout, 100);

        assert_eq!(timers.pop_due(100), Some(TimerKind::ChallengeSample));
        // the handler of the first timer re-arms the second
        timers.schedule(TimerKind::ChallengeTimeout, 5_000);
        assert_eq!(timers.pop_due(100), None);
    }

    #[test]
    fn test_cancel_all() {
        let mut timers = TimerQueue::new();
        timers.schedule(TimerKind::Retry, 10);
        timers.schedule(TimerKind::Advance, 20);
        timers.cancel_all();
        assert_eq!(timers.pop_due(u64::MAX), None);
    }
}
