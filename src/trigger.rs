// src/trigger.rs

use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::op::TriggeredOp;

/// An operation waiting for its counter to reach `threshold`.
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub threshold: u64,
    pub op: TriggeredOp,
}

impl Trigger {
    pub fn new(threshold: u64, op: TriggeredOp) -> Self {
        Self { threshold, op }
    }
}

/// Triggers ordered by ascending threshold.
///
/// Equal thresholds keep arrival order. Only the head is ever eligible
/// first, so evaluation stops at the first trigger above the counter value.
#[derive(Debug, Default)]
pub struct TriggerQueue {
    entries: VecDeque<Trigger>,
}

impl TriggerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a queue with room for `capacity` triggers.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let mut entries = VecDeque::new();
        entries
            .try_reserve(capacity)
            .map_err(|_| Error::OutOfMemory)?;
        Ok(Self { entries })
    }

    /// Insert after every trigger whose threshold is `<=` the new one.
    pub fn insert(&mut self, trigger: Trigger) {
        let pos = self
            .entries
            .partition_point(|t| t.threshold <= trigger.threshold);
        self.entries.insert(pos, trigger);
    }

    /// Unlink the head if `value` satisfies its threshold.
    pub fn pop_ready(&mut self, value: u64) -> Option<Trigger> {
        match self.entries.front() {
            Some(head) if head.threshold <= value => self.entries.pop_front(),
            _ => None,
        }
    }

    /// Threshold of the next trigger to fire.
    pub fn next_threshold(&self) -> Option<u64> {
        self.entries.front().map(|t| t.threshold)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn thresholds(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.iter().map(|t| t.threshold)
    }

    /// Remove every pending trigger, in queue order.
    pub fn drain(&mut self) -> impl Iterator<Item = Trigger> + '_ {
        self.entries.drain(..)
    }
}
