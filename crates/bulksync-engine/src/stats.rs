//! Run statistics.

use serde::Serialize;

use crate::reconciler::DeleteCounts;

/// Counters for one bulk run, across all of its content types.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunStats {
    /// Fetches that returned a batch
    pub fetches: usize,
    /// Rows examined across all fetches
    pub examined: usize,
    /// Ids that passed the indexability predicate
    pub admitted: usize,
    /// Documents built and sent
    pub written: usize,
    /// Admitted ids whose builder returned no document
    pub absent: usize,
    /// Documents skipped because building failed
    pub build_errors: usize,
    /// Bulk write calls
    pub write_calls: usize,
    /// Delete-by-filter calls, by kind
    pub deletes: DeleteCounts,
    /// Content types finished
    pub content_types_completed: usize,
    /// Fetch size after the latest adjustment
    pub batch_size: usize,
    /// Cursor after the latest fetch of the latest content type
    pub cursor: u64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one fetched batch.
    pub fn record_fetch(
        &mut self,
        examined: usize,
        admitted: usize,
        next_batch_size: usize,
        cursor: u64,
    ) {
        self.fetches += 1;
        self.cursor = cursor;
        self.examined += examined;
        self.admitted += admitted;
        self.batch_size = next_batch_size;
    }

    /// Record one successful bulk write.
    pub fn record_write(&mut self, documents: usize) {
        self.write_calls += 1;
        self.written += documents;
    }

    pub fn record_absent(&mut self) {
        self.absent += 1;
    }

    pub fn record_build_error(&mut self) {
        self.build_errors += 1;
    }

    pub fn record_completed_type(&mut self) {
        self.content_types_completed += 1;
    }

    /// Rows examined but never built.
    pub fn rejected(&self) -> usize {
        self.examined.saturating_sub(self.admitted)
    }

    pub fn merge(&mut self, other: &RunStats) {
        self.fetches += other.fetches;
        self.examined += other.examined;
        self.admitted += other.admitted;
        self.written += other.written;
        self.absent += other.absent;
        self.build_errors += other.build_errors;
        self.write_calls += other.write_calls;
        self.deletes.merge(&other.deletes);
        self.content_types_completed += other.content_types_completed;
        if other.fetches > 0 {
            self.batch_size = other.batch_size;
            self.cursor = other.cursor;
        }
    }
}
