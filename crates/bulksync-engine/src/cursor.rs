//! Scan position tracking for one run.
//!
//! The cursor only ever moves forward: each fetch examines ids at or above
//! `current_id` and moves it past the last examined id, whether or not any of
//! those ids were admitted.

use serde::{Deserialize, Serialize};

/// Monotonic scan position for one `(scope, content type)` run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Inclusive lower bound for the next fetch
    pub current_id: u64,

    /// First id examined by the latest fetch
    pub first_id_in_batch: Option<u64>,

    /// Last id examined by the latest fetch
    pub last_id_in_batch: Option<u64>,

    /// Ids below this have been reconciled by delete filters
    pub delete_checkpoint_id: u64,

    /// Set once the source is exhausted or the upper bound is reached
    pub done: bool,
}

impl Cursor {
    /// A cursor positioned at `start_id`.
    pub fn new(start_id: u64) -> Self {
        Self {
            current_id: start_id,
            first_id_in_batch: None,
            last_id_in_batch: None,
            delete_checkpoint_id: start_id,
            done: false,
        }
    }

    /// Record a fetch that examined `[first, last]`.
    ///
    /// Ignores ranges that would move the cursor backwards. Examining
    /// `u64::MAX` ends the scan, since no id lies past it.
    pub fn advance(&mut self, first: u64, last: u64) {
        if last < self.current_id || first > last {
            return;
        }
        self.first_id_in_batch = Some(first);
        self.last_id_in_batch = Some(last);
        match last.checked_add(1) {
            Some(next) => self.current_id = next,
            None => {
                self.current_id = last;
                self.mark_done();
            }
        }
    }

    pub fn mark_done(&mut self) {
        self.done = true;
    }

    /// Width of the latest examined id range, at least 1.
    pub fn batch_span(&self) -> u64 {
        match (self.first_id_in_batch, self.last_id_in_batch) {
            (Some(first), Some(last)) => last - first + 1,
            _ => 1,
        }
    }
}

/// One fetch worth of ids.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Batch {
    /// Cursor position before the fetch (resume point for this batch)
    pub start_id: u64,

    /// First examined id, if any row was examined
    pub first_id: Option<u64>,

    /// Last examined id, if any row was examined
    pub last_id: Option<u64>,

    /// Rows examined by the fetch
    pub examined: usize,

    /// Ids that passed the indexability predicate, in ascending order
    pub admitted: Vec<u64>,
}

impl Batch {
    pub fn is_empty(&self) -> bool {
        self.admitted.is_empty()
    }

    /// Rows examined but rejected by the predicate.
    pub fn rejected(&self) -> usize {
        self.examined.saturating_sub(self.admitted.len())
    }
}
