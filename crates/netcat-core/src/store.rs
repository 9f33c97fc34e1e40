//! Bounded per-session message history.
//!
//! Holds the N most recent records (oldest evicted first) while keeping an
//! all-time insert counter that survives both eviction and [`MessageStore::clear`].

use std::collections::VecDeque;

use crate::domain::NetcatMessage;

/// Default number of records kept per session.
pub const DEFAULT_CAPACITY: usize = 500;

#[derive(Debug, Clone)]
pub struct MessageStore {
    records: VecDeque<NetcatMessage>,
    capacity: usize,
    total_appended: u64,
}

impl MessageStore {
    /// Creates an empty store.  A capacity of 0 is raised to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
            capacity,
            total_appended: 0,
        }
    }

    /// Appends a record, evicting the oldest one when full.
    ///
    /// Returns the evicted record, if any.
    pub fn push(&mut self, message: NetcatMessage) -> Option<NetcatMessage> {
        self.total_appended += 1;
        let evicted = if self.records.len() == self.capacity {
            self.records.pop_front()
        } else {
            None
        };
        self.records.push_back(message);
        evicted
    }

    /// Up to `limit` records, most recent first.
    pub fn recent(&self, limit: usize) -> Vec<NetcatMessage> {
        self.records.iter().rev().take(limit).cloned().collect()
    }

    /// Drops every stored record; the all-time counter is untouched.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of records ever appended, including evicted and cleared ones.
    pub fn total_appended(&self) -> u64 {
        self.total_appended
    }
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
