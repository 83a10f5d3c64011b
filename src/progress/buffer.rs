//! Bounded FIFO of progress events held while feedback mode is active.

use super::ProgressEvent;
use std::collections::VecDeque;

/// Default number of events retained while feedback mode is active.
pub const DEFAULT_BUFFER_CAPACITY: usize = 100;

/// Bounded FIFO. On overflow the oldest event is evicted; order of the
/// survivors is never changed.
#[derive(Debug, Clone)]
pub struct EventBuffer {
    events: VecDeque<ProgressEvent>,
    capacity: usize,
    evicted: u64,
}

impl EventBuffer {
    /// Create a buffer holding at most `capacity` events (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            evicted: 0,
        }
    }

    /// Append an event, returning the evicted oldest event on overflow.
    pub fn push(&mut self, event: ProgressEvent) -> Option<ProgressEvent> {
        let evicted = if self.events.len() >= self.capacity {
            self.evicted += 1;
            self.events.pop_front()
        } else {
            None
        };
        self.events.push_back(event);
        evicted
    }

    /// Remove and return all events, oldest first. Resets the eviction count.
    pub fn drain(&mut self) -> Vec<ProgressEvent> {
        self.evicted = 0;
        self.events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events dropped by overflow since the last drain.
    pub fn evicted_count(&self) -> u64 {
        self.evicted
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProgressEvent> {
        self.events.iter()
    }
}

impl Default for EventBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}
