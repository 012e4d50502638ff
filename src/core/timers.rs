//! Deadline queue for the coordinator's deferred work.
//!
//! Each entry captures the coordinator epoch at schedule time; the coordinator
//! compares it against the current epoch when the entry comes due.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::core::types::{Direction, Key, ReasonCode, Side, SignalKind};

/// One pulse or confirm key press belonging to a burst
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BurstKey {
    pub key: Key,
    pub side: Side,
    pub direction: Direction,
    pub diff_pct: f64,
    /// Position within the burst, 1-based
    pub index: u32,
    pub of: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimerKind {
    /// Regular trading step
    Step,
    /// Alignment loop re-check
    AlignmentCheck,
    Pulse(BurstKey),
    Confirm(BurstKey),
    /// Re-send a suspend/resume signal if the target did not react
    SignalRetry {
        kind: SignalKind,
        reason: Option<ReasonCode>,
    },
    /// Re-run the reactive resume check once the resume cooldown has passed
    ResumeCheck,
}

impl TimerKind {
    /// Kinds of which at most one may be pending
    fn slot(&self) -> Option<u8> {
        match self {
            TimerKind::Step => Some(0),
            TimerKind::AlignmentCheck => Some(1),
            TimerKind::SignalRetry { .. } => Some(2),
            TimerKind::ResumeCheck => Some(3),
            TimerKind::Pulse(_) | TimerKind::Confirm(_) => None,
        }
    }

    pub fn is_burst(&self) -> bool {
        matches!(self, TimerKind::Pulse(_) | TimerKind::Confirm(_))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Timer {
    pub deadline_ms: u64,
    pub epoch: u64,
    pub kind: TimerKind,
    seq: u64,
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.deadline_ms == other.deadline_ms && self.seq == other.seq
    }
}

impl Eq for Timer {}

impl Ord for Timer {
    // Reversed so the max-heap pops the earliest deadline, then FIFO
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline_ms
            .cmp(&self.deadline_ms)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
pub struct TimerQueue {
    heap: BinaryHeap<Timer>,
    next_seq: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `kind`. Single-slot kinds replace any pending entry of the same kind.
    pub fn schedule(&mut self, deadline_ms: u64, epoch: u64, kind: TimerKind) {
        if let Some(slot) = kind.slot() {
            self.heap.retain(|t| t.kind.slot() != Some(slot));
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Timer {
            deadline_ms,
            epoch,
            kind,
            seq,
        });
    }

    /// Drop pending entries matching `pred`
    pub fn cancel_where(&mut self, mut pred: impl FnMut(&TimerKind) -> bool) {
        self.heap.retain(|t| !pred(&t.kind));
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.heap.peek().map(|t| t.deadline_ms)
    }

    /// Pop the earliest entry whose deadline has passed
    pub fn pop_due(&mut self, now_ms: u64) -> Option<Timer> {
        match self.heap.peek() {
            Some(t) if t.deadline_ms <= now_ms => self.heap.pop(),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    #[cfg(test)]
    pub fn contains(&self, mut pred: impl FnMut(&TimerKind) -> bool) -> bool {
        self.heap.iter().any(|t| pred(&t.kind))
    }
}
