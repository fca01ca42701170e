//! Source iterators.
//!
//! A [`SourceIterator`] produces ordered batches of candidate ids for one
//! `(scope, content type)` run and owns the run's cursor and delete
//! checkpoint. Iterators are built by an [`IteratorFactory`] so each content
//! type can pick the scanning strategy that fits its shape:
//!
//! - [`ScanIterator`]: id-ordered table scan with adaptive batch sizing
//! - [`SingleDocumentIterator`]: one scope-level document (e.g. the site itself)
//! - [`EmptyIterator`]: nothing to index
//!
//! ## Delete reconciliation
//!
//! Iterators also describe which stale documents may be removed, and when:
//!
//! - `pre_delete_filter`: everything at or above the start id, issued before
//!   iteration when the candidate count is small
//! - `next_delete_filter`: a ranged filter issued during iteration. It reaches
//!   `span × delete_batch_multiple` ids past the latest batch so it is only
//!   issued again once the cursor has moved past the covered range. After
//!   every batch the delete checkpoint is strictly above every examined id.
//! - `post_delete_filter`: everything past the final checkpoint, issued once
//!   at run end

use std::sync::Arc;

use bulksync_types::{DeleteFilter, ScopeId, Settings};
use tracing::{debug, trace};

use crate::batch_size::BatchSizer;
use crate::builder::DocumentBuilder;
use crate::cursor::{Batch, Cursor};
use crate::error::{SourceError, SyncError};
use crate::source::IdSource;

/// Tunables for building iterators.
#[derive(Debug, Clone)]
pub struct IteratorConfig {
    /// Admitted ids aimed for per fetch
    pub target_batch_size: usize,
    /// Look-ahead of ranged deletes, in batch spans
    pub delete_batch_multiple: u64,
    /// Inclusive upper bound on scanned ids
    pub max_id: Option<u64>,
}

impl Default for IteratorConfig {
    fn default() -> Self {
        Self {
            target_batch_size: 150,
            delete_batch_multiple: 20,
            max_id: None,
        }
    }
}

impl IteratorConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            target_batch_size: settings.target_batch_size,
            delete_batch_multiple: settings.delete_batch_multiple,
            max_id: None,
        }
    }

    /// Set the target batch size.
    pub fn with_target_batch_size(mut self, size: usize) -> Self {
        self.target_batch_size = size;
        self
    }

    /// Set the ranged delete look-ahead multiple.
    pub fn with_delete_batch_multiple(mut self, multiple: u64) -> Self {
        self.delete_batch_multiple = multiple;
        self
    }

    /// Stop the scan after this id.
    pub fn with_max_id(mut self, max_id: u64) -> Self {
        self.max_id = Some(max_id);
        self
    }
}

/// Ordered id batches for one run.
pub trait SourceIterator: Send {
    /// Estimate of in-scope rows at or above the start id, before filtering.
    fn count_potential_docs(&mut self) -> Result<u64, SourceError>;

    /// Fetch the next batch.
    ///
    /// Returns `Ok(None)` once the source is exhausted. On error the cursor
    /// is unchanged and the call may be retried.
    fn get_ids(&mut self) -> Result<Option<Batch>, SourceError>;

    fn cursor(&self) -> &Cursor;

    fn is_done(&self) -> bool {
        self.cursor().done
    }

    /// Current fetch size.
    fn batch_size(&self) -> usize;

    /// Wipe filter issued before iteration in small runs.
    fn pre_delete_filter(&self) -> Option<DeleteFilter>;

    /// Ranged filter for the ids examined so far, if one is due.
    ///
    /// Advances the delete checkpoint when it returns a filter.
    fn next_delete_filter(&mut self) -> Option<DeleteFilter>;

    /// Filter for stragglers past the final checkpoint.
    fn post_delete_filter(&self) -> Option<DeleteFilter>;
}

/// Creates the iterator for one run of a content type.
pub trait IteratorFactory: Send + Sync {
    fn create(
        &self,
        scope: ScopeId,
        start_id: u64,
        builder: Arc<dyn DocumentBuilder>,
        config: &IteratorConfig,
    ) -> Result<Box<dyn SourceIterator>, SyncError>;
}

/// Id-ordered scan over an [`IdSource`].
pub struct ScanIterator {
    source: Arc<dyn IdSource>,
    builder: Arc<dyn DocumentBuilder>,
    scope: ScopeId,
    start_id: u64,
    cursor: Cursor,
    sizer: BatchSizer,
    delete_batch_multiple: u64,
    max_id: Option<u64>,
    /// Set once a ranged delete has covered up to `u64::MAX`
    deletes_exhausted: bool,
}

impl ScanIterator {
    /// Position a new scan at `start_id`.
    pub fn init(
        source: Arc<dyn IdSource>,
        builder: Arc<dyn DocumentBuilder>,
        scope: ScopeId,
        start_id: u64,
        config: &IteratorConfig,
    ) -> Self {
        Self {
            source,
            builder,
            scope,
            start_id,
            cursor: Cursor::new(start_id),
            sizer: BatchSizer::new(config.target_batch_size),
            delete_batch_multiple: config.delete_batch_multiple.max(1),
            max_id: config.max_id,
            deletes_exhausted: false,
        }
    }

    fn past_upper_bound(&self, id: u64) -> bool {
        self.max_id.is_some_and(|max| id > max)
    }
}

impl SourceIterator for ScanIterator {
    fn count_potential_docs(&mut self) -> Result<u64, SourceError> {
        self.source.count(self.scope, self.start_id)
    }

    fn get_ids(&mut self) -> Result<Option<Batch>, SourceError> {
        if self.cursor.done {
            return Ok(None);
        }
        let start_id = self.cursor.current_id;
        if self.past_upper_bound(start_id) {
            self.cursor.mark_done();
            return Ok(None);
        }

        let mut fetched = self
            .source
            .fetch_ids(self.scope, start_id, self.sizer.current())?;

        if fetched.is_empty() {
            debug!(scope = %self.scope, cursor = start_id, "Source exhausted");
            self.cursor.mark_done();
            return Ok(None);
        }

        // Keep the cursor monotonic even if the source misbehaves.
        fetched.sort_unstable();
        fetched.dedup();
        fetched.retain(|id| *id >= start_id);

        let mut examined = Vec::with_capacity(fetched.len());
        for id in fetched {
            if self.past_upper_bound(id) {
                self.cursor.mark_done();
                break;
            }
            examined.push(id);
        }

        let (Some(&first), Some(&last)) = (examined.first(), examined.last()) else {
            if self.cursor.done {
                return Ok(None);
            }
            // Rows came back but none at or above the cursor: zero progress.
            return Ok(Some(Batch {
                start_id,
                ..Batch::default()
            }));
        };

        self.cursor.advance(first, last);
        if self.max_id == Some(last) {
            self.cursor.mark_done();
        }

        let examined_count = examined.len();
        let admitted: Vec<u64> = examined
            .into_iter()
            .filter(|id| self.builder.is_indexable(self.scope, *id))
            .collect();

        let previous = self.sizer.current();
        let next = self.sizer.adjust(admitted.len());
        trace!(
            scope = %self.scope,
            first = first,
            last = last,
            examined = examined_count,
            admitted = admitted.len(),
            batch_size = previous,
            next_batch_size = next,
            "Fetched batch"
        );

        Ok(Some(Batch {
            start_id,
            first_id: Some(first),
            last_id: Some(last),
            examined: examined_count,
            admitted,
        }))
    }

    fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    fn batch_size(&self) -> usize {
        self.sizer.current()
    }

    fn pre_delete_filter(&self) -> Option<DeleteFilter> {
        Some(DeleteFilter::Pre {
            from: self.start_id,
        })
    }

    fn next_delete_filter(&mut self) -> Option<DeleteFilter> {
        let last = self.cursor.last_id_in_batch?;
        if self.deletes_exhausted || last < self.cursor.delete_checkpoint_id {
            return None;
        }
        let from = self.cursor.delete_checkpoint_id;
        let reach = self
            .cursor
            .batch_span()
            .saturating_mul(self.delete_batch_multiple);
        let mut to = last.saturating_add(reach);
        if let Some(max) = self.max_id {
            to = to.min(max).max(last);
        }
        match to.checked_add(1) {
            Some(next) => self.cursor.delete_checkpoint_id = next,
            None => {
                self.cursor.delete_checkpoint_id = to;
                self.deletes_exhausted = true;
            }
        }
        Some(DeleteFilter::Ranged { from, to })
    }

    fn post_delete_filter(&self) -> Option<DeleteFilter> {
        let from = self.cursor.delete_checkpoint_id;
        if self.deletes_exhausted {
            return None;
        }
        match self.max_id {
            Some(max) if from > max => None,
            to => Some(DeleteFilter::Post { from, to }),
        }
    }
}

/// Factory for [`ScanIterator`]s over a shared source.
pub struct ScanFactory {
    source: Arc<dyn IdSource>,
    max_id: Option<u64>,
}

impl ScanFactory {
    pub fn new(source: Arc<dyn IdSource>) -> Self {
        Self {
            source,
            max_id: None,
        }
    }

    /// Bound every scan built by this factory.
    pub fn with_max_id(mut self, max_id: u64) -> Self {
        self.max_id = Some(max_id);
        self
    }
}

impl IteratorFactory for ScanFactory {
    fn create(
        &self,
        scope: ScopeId,
        start_id: u64,
        builder: Arc<dyn DocumentBuilder>,
        config: &IteratorConfig,
    ) -> Result<Box<dyn SourceIterator>, SyncError> {
        let mut config = config.clone();
        if let Some(max) = self.max_id {
            config.max_id = Some(config.max_id.map_or(max, |m| m.min(max)));
        }
        Ok(Box::new(ScanIterator::init(
            self.source.clone(),
            builder,
            scope,
            start_id,
            &config,
        )))
    }
}

/// Iterator over a single scope-level document whose id is the scope id.
///
/// It is only ever overwritten, so it never issues ranged or post deletes.
pub struct SingleDocumentIterator {
    builder: Arc<dyn DocumentBuilder>,
    scope: ScopeId,
    doc_id: u64,
    start_id: u64,
    cursor: Cursor,
}

impl SingleDocumentIterator {
    pub fn init(builder: Arc<dyn DocumentBuilder>, scope: ScopeId, start_id: u64) -> Self {
        let doc_id = scope.get();
        let mut cursor = Cursor::new(start_id);
        if start_id > doc_id {
            cursor.mark_done();
        }
        Self {
            builder,
            scope,
            doc_id,
            start_id,
            cursor,
        }
    }
}

impl SourceIterator for SingleDocumentIterator {
    fn count_potential_docs(&mut self) -> Result<u64, SourceError> {
        Ok(if self.start_id > self.doc_id { 0 } else { 1 })
    }

    fn get_ids(&mut self) -> Result<Option<Batch>, SourceError> {
        if self.cursor.done {
            return Ok(None);
        }
        let start_id = self.cursor.current_id;
        self.cursor.advance(self.doc_id, self.doc_id);
        self.cursor.mark_done();

        let admitted = if self.builder.is_indexable(self.scope, self.doc_id) {
            vec![self.doc_id]
        } else {
            Vec::new()
        };
        Ok(Some(Batch {
            start_id,
            first_id: Some(self.doc_id),
            last_id: Some(self.doc_id),
            examined: 1,
            admitted,
        }))
    }

    fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    fn batch_size(&self) -> usize {
        1
    }

    fn pre_delete_filter(&self) -> Option<DeleteFilter> {
        Some(DeleteFilter::Pre {
            from: self.start_id,
        })
    }

    fn next_delete_filter(&mut self) -> Option<DeleteFilter> {
        None
    }

    fn post_delete_filter(&self) -> Option<DeleteFilter> {
        None
    }
}

/// Factory for [`SingleDocumentIterator`]s.
pub struct SingleDocumentFactory;

impl IteratorFactory for SingleDocumentFactory {
    fn create(
        &self,
        scope: ScopeId,
        start_id: u64,
        builder: Arc<dyn DocumentBuilder>,
        _config: &IteratorConfig,
    ) -> Result<Box<dyn SourceIterator>, SyncError> {
        Ok(Box::new(SingleDocumentIterator::init(
            builder, scope, start_id,
        )))
    }
}

/// Iterator for content types with nothing to index.
pub struct EmptyIterator {
    cursor: Cursor,
}

impl EmptyIterator {
    pub fn new(start_id: u64) -> Self {
        let mut cursor = Cursor::new(start_id);
        cursor.mark_done();
        Self { cursor }
    }
}

impl SourceIterator for EmptyIterator {
    fn count_potential_docs(&mut self) -> Result<u64, SourceError> {
        Ok(0)
    }

    fn get_ids(&mut self) -> Result<Option<Batch>, SourceError> {
        Ok(None)
    }

    fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    fn batch_size(&self) -> usize {
        0
    }

    fn pre_delete_filter(&self) -> Option<DeleteFilter> {
        None
    }

    fn next_delete_filter(&mut self) -> Option<DeleteFilter> {
        None
    }

    fn post_delete_filter(&self) -> Option<DeleteFilter> {
        None
    }
}

/// Factory for [`EmptyIterator`]s.
pub struct EmptyFactory;

impl IteratorFactory for EmptyFactory {
    fn create(
        &self,
        _scope: ScopeId,
        start_id: u64,
        _builder: Arc<dyn DocumentBuilder>,
        _config: &IteratorConfig,
    ) -> Result<Box<dyn SourceIterator>, SyncError> {
        Ok(Box::new(EmptyIterator::new(start_id)))
    }
}
