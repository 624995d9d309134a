// Copyright (c) 2026 envfuse contributors
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/envfuse/envfuse

//! Bounded, insertion-ordered store of fused readings

use std::collections::VecDeque;

use crate::reading::Reading;

/// Fixed-capacity FIFO of fused readings.
///
/// Capacity is fixed at construction and validated by the config layer
/// (must be at least 1). Entries are ordered by append, which the scheduler
/// guarantees is timestamp-non-decreasing; duplicate timestamps are
/// accepted as-is with no dedup.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    buf: VecDeque<Reading>,
    capacity: usize,
}

impl HistoryBuffer {
    /// New empty buffer holding at most `capacity` readings.
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0, "capacity is validated by the config layer");
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a reading, evicting the oldest entry when full.
    pub fn append(&mut self, reading: Reading) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(reading);
    }

    /// Owned, ordered copy of the buffer. Callers never observe the live
    /// structure mid-mutation.
    pub fn snapshot(&self) -> Vec<Reading> {
        self.buf.iter().cloned().collect()
    }

    /// Most recent reading, if any.
    pub fn latest(&self) -> Option<&Reading> {
        self.buf.back()
    }

    /// Number of readings currently held.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True when no reading has been appended yet.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Maximum number of readings this buffer retains.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
