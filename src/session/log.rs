//! Bounded session log
//!
//! Fixed-capacity ring: the write cursor wraps to slot 0 and overwrites
//! the oldest entry, so the log never grows past capacity.

use crate::session::event::Event;

/// Entries kept before the oldest is overwritten.
pub const MAX_SESSION_EVENTS: usize = 1000;

#[derive(Debug)]
pub struct EventLog {
    entries: Vec<Event>,
    /// Slot the next append writes to.
    cursor: usize,
    capacity: usize,
}

impl EventLog {
    pub fn new() -> EventLog {
        EventLog::with_capacity(MAX_SESSION_EVENTS)
    }

    pub fn with_capacity(capacity: usize) -> EventLog {
        EventLog {
            entries: Vec::new(),
            cursor: 0,
            capacity: capacity.max(1),
        }
    }

    /// Appends, overwriting the oldest entry once full.
    pub fn append(&mut self, event: Event) {
        if self.cursor == self.entries.len() && self.entries.len() < self.capacity {
            self.entries.push(event);
        } else {
            self.entries[self.cursor] = event;
        }
        self.cursor += 1;
        if self.cursor == self.capacity {
            self.cursor = 0;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Entries in slot order. Slot 0 is not the oldest once wrapped.
    pub fn slots(&self) -> &[Event] {
        &self.entries
    }

    /// Entries oldest to newest.
    pub fn in_order(&self) -> impl Iterator<Item = &Event> {
        let split = self.cursor.min(self.entries.len());
        let (head, tail) = self.entries.split_at(split);
        tail.iter().chain(head.iter())
    }
}

impl Default for EventLog {
    fn default() -> Self {
        EventLog::new()
    }
}
