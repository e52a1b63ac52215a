//! Bounded linear undo/redo history.
//!
//! DESIGN
//! ======
//! Snapshots are kept oldest-first in a `VecDeque` with a cursor marking the
//! live entry. Committing after an undo discards everything past the cursor,
//! so history stays linear. Overflow evicts from the front, and the cursor is
//! always re-pointed at the newest entry after a commit, so
//! `cursor < len()` holds by construction.

use std::collections::VecDeque;

pub const DEFAULT_HISTORY_CAPACITY: usize = 30;

#[derive(Clone, Debug)]
pub struct History<T> {
    entries: VecDeque<T>,
    cursor: usize,
    capacity: usize,
}

impl<T> History<T> {
    /// Start a history holding only `initial`. A zero capacity is treated as 1.
    #[must_use]
    pub fn new(initial: T, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut entries = VecDeque::with_capacity(capacity);
        entries.push_back(initial);
        Self { entries, cursor: 0, capacity }
    }

    /// The snapshot under the cursor.
    #[must_use]
    pub fn current(&self) -> &T {
        &self.entries[self.cursor]
    }

    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshots oldest-first.
    pub fn entries(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    /// Append `value` as the newest snapshot, dropping any redo branch and
    /// evicting the oldest entries past capacity.
    pub fn commit(&mut self, value: T) {
        self.entries.truncate(self.cursor + 1);
        self.entries.push_back(value);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        self.cursor = self.entries.len() - 1;
    }

    /// Step back one snapshot. Returns the new current snapshot, or `None` at
    /// the oldest entry.
    pub fn undo(&mut self) -> Option<&T> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        Some(self.current())
    }

    /// Step forward one snapshot. Returns the new current snapshot, or `None`
    /// at the newest entry.
    pub fn redo(&mut self) -> Option<&T> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        Some(self.current())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "history_test.rs"]
mod tests;
