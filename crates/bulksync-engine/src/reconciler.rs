//! Delete reconciliation.
//!
//! Stale documents (rows deleted or made non-indexable in the source) are
//! removed with range-based delete-by-filter calls. The strategy is chosen
//! once per run from the estimated candidate count:
//!
//! - [`DeleteStrategy::Pre`]: one wipe before iteration, nothing afterwards
//! - [`DeleteStrategy::Incremental`]: ranged deletes during iteration plus a
//!   single post delete at the end
//!
//! Filters are re-appliable, so reissuing them on a resumed run is safe.

use bulksync_types::{ContentType, DeleteFilter, DeleteRequest, ScopeId};
use serde::Serialize;
use tracing::debug;

use crate::client::{WriteClient, WriteError};
use crate::iterator::SourceIterator;

/// Delete strategy for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStrategy {
    /// Wipe everything at or above the start id before iterating
    Pre,
    /// Ranged deletes as the cursor advances, post delete at the end
    Incremental,
}

impl DeleteStrategy {
    /// `Pre` below the threshold, `Incremental` at or above it.
    pub fn select(potential_docs: u64, threshold: u64) -> Self {
        if potential_docs < threshold {
            DeleteStrategy::Pre
        } else {
            DeleteStrategy::Incremental
        }
    }
}

impl std::fmt::Display for DeleteStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeleteStrategy::Pre => write!(f, "pre"),
            DeleteStrategy::Incremental => write!(f, "incremental"),
        }
    }
}

/// Delete calls issued by a reconciler.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeleteCounts {
    pub pre: usize,
    pub ranged: usize,
    pub post: usize,
    /// Field-matched deletes issued outside the strategy
    pub field: usize,
}

impl DeleteCounts {
    pub fn total(&self) -> usize {
        self.pre + self.ranged + self.post + self.field
    }

    pub fn merge(&mut self, other: &DeleteCounts) {
        self.pre += other.pre;
        self.ranged += other.ranged;
        self.post += other.post;
        self.field += other.field;
    }
}

/// Issues a run's delete filters through the write client.
pub struct DeleteReconciler<'a> {
    client: &'a dyn WriteClient,
    scope: ScopeId,
    content_type: ContentType,
    strategy: DeleteStrategy,
    counts: DeleteCounts,
}

impl<'a> DeleteReconciler<'a> {
    pub fn new(
        client: &'a dyn WriteClient,
        scope: ScopeId,
        content_type: ContentType,
        strategy: DeleteStrategy,
    ) -> Self {
        Self {
            client,
            scope,
            content_type,
            strategy,
            counts: DeleteCounts::default(),
        }
    }

    pub fn strategy(&self) -> DeleteStrategy {
        self.strategy
    }

    pub fn counts(&self) -> DeleteCounts {
        self.counts
    }

    /// Issue the pre wipe if the strategy calls for one.
    pub fn before_iteration(&mut self, iterator: &dyn SourceIterator) -> Result<(), WriteError> {
        if self.strategy != DeleteStrategy::Pre {
            return Ok(());
        }
        if let Some(filter) = iterator.pre_delete_filter() {
            self.issue(filter)?;
        }
        Ok(())
    }

    /// Issue a ranged delete after a fetch, if one is due.
    ///
    /// Called before the batch's bulk write.
    pub fn after_fetch(&mut self, iterator: &mut dyn SourceIterator) -> Result<(), WriteError> {
        if self.strategy != DeleteStrategy::Incremental {
            return Ok(());
        }
        if let Some(filter) = iterator.next_delete_filter() {
            self.issue(filter)?;
        }
        Ok(())
    }

    /// Issue the post delete after the source is exhausted.
    pub fn after_iteration(&mut self, iterator: &dyn SourceIterator) -> Result<(), WriteError> {
        if self.strategy != DeleteStrategy::Incremental {
            return Ok(());
        }
        if let Some(filter) = iterator.post_delete_filter() {
            self.issue(filter)?;
        }
        Ok(())
    }

    /// Send one filter, regardless of strategy.
    pub fn issue(&mut self, filter: DeleteFilter) -> Result<(), WriteError> {
        debug!(
            scope = %self.scope,
            content_type = %self.content_type,
            filter = %filter,
            "Issuing delete"
        );
        let request = DeleteRequest::new(self.scope, self.content_type.clone(), filter);
        self.client.delete_by_filter(&request)?;
        let counter = match request.filter {
            DeleteFilter::Pre { .. } => &mut self.counts.pre,
            DeleteFilter::Ranged { .. } => &mut self.counts.ranged,
            DeleteFilter::Post { .. } => &mut self.counts.post,
            DeleteFilter::Field { .. } => &mut self.counts.field,
        };
        *counter += 1;
        Ok(())
    }
}
