//! Bounded ring buffer for the session event log.

use serde::{Deserialize, Serialize};
use shop_core::GameEvent;
use std::collections::VecDeque;

/// Number of events the game state retains.
pub const EVENT_LOG_CAPACITY: usize = 50;

/// Fixed-capacity event log; pushing into a full ring drops the oldest entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventRing {
    events: VecDeque<GameEvent>,
    capacity: usize,
    /// Total events ever pushed, including dropped ones.
    total_written: u64,
}

impl Default for EventRing {
    fn default() -> Self {
        Self::new(EVENT_LOG_CAPACITY)
    }
}

impl EventRing {
    /// A capacity of 0 is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            total_written: 0,
        }
    }

    pub fn push(&mut self, event: GameEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
        self.total_written += 1;
    }

    pub fn extend<I: IntoIterator<Item = GameEvent>>(&mut self, events: I) {
        for e in events {
            self.push(e);
        }
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &GameEvent> {
        self.events.iter()
    }

    pub fn latest(&self) -> Option<&GameEvent> {
        self.events.back()
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

    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Events that were pushed out of the ring.
    pub fn dropped(&self) -> u64 {
        self.total_written - self.events.len() as u64
    }
}
