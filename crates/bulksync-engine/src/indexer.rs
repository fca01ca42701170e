//! Bulk index/delete orchestrator.
//!
//! [`BulkIndexer`] drives one or more `(scope, content type)` runs to
//! completion. Each run:
//!
//! 1. Picks a delete strategy from the candidate count and issues the pre
//!    wipe if that strategy calls for one.
//! 2. Fetches batches. Each batch may issue a ranged delete and then builds
//!    every admitted id, checking the memory gate before each document is
//!    added to the write batch.
//! 3. Sends the built documents as one bulk write per fetched batch.
//! 4. Issues the post delete once the source is exhausted.
//!
//! Runs are bounded by memory, cancellation and an optional deadline. Every
//! interruption returns a [`ResumeState`] pointing at the start of the batch
//! in flight, so resuming re-fetches at most that one batch. Infrastructure
//! failures come back as [`RunOutcome::RetryLater`]. Fatal failures are
//! returned as `Err`.

use std::sync::Arc;
use std::time::Instant;

use bulksync_types::{ContentType, DeleteFilter, Document, ResumeState, ScopeId, Settings};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::builder::DocumentBuilder;
use crate::client::WriteClient;
use crate::cursor::Batch;
use crate::error::{SourceError, SyncError};
use crate::iterator::{IteratorConfig, SourceIterator};
use crate::memory::{MemoryGate, NoMemoryLimit};
use crate::progress::{NoOpProgressCallback, ProgressCallback};
use crate::reconciler::{DeleteReconciler, DeleteStrategy};
use crate::registry::BuilderRegistry;
use crate::stats::RunStats;

/// Orchestrator tunables.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Iterator sizing and delete look-ahead
    pub iterator: IteratorConfig,
    /// Candidate count below which runs use the pre wipe
    pub pre_delete_threshold: u64,
    /// Consecutive zero-row fetches tolerated before failing the run
    pub max_stalled_fetches: usize,
    /// Skip documents whose build fails instead of failing the run
    pub continue_on_build_error: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            iterator: IteratorConfig::default(),
            pre_delete_threshold: 3000,
            max_stalled_fetches: 1000,
            continue_on_build_error: true,
        }
    }
}

impl IndexerConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            iterator: IteratorConfig::from_settings(settings),
            pre_delete_threshold: settings.pre_delete_threshold,
            max_stalled_fetches: settings.max_stalled_fetches,
            continue_on_build_error: settings.continue_on_build_error,
        }
    }

    /// Set the iterator config.
    pub fn with_iterator(mut self, iterator: IteratorConfig) -> Self {
        self.iterator = iterator;
        self
    }

    /// Set the pre-delete threshold.
    pub fn with_pre_delete_threshold(mut self, threshold: u64) -> Self {
        self.pre_delete_threshold = threshold;
        self
    }

    /// Set the stalled fetch limit.
    pub fn with_max_stalled_fetches(mut self, attempts: usize) -> Self {
        self.max_stalled_fetches = attempts;
        self
    }

    /// Set whether to continue on build errors.
    pub fn with_continue_on_build_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_build_error = continue_on_error;
        self
    }
}

/// What to synchronize.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub scope: ScopeId,
    /// Processed in order
    pub content_types: Vec<ContentType>,
    /// Start id for the first content type; later types start at 0
    pub start_id: u64,
    pub cancel: Option<CancellationToken>,
    pub deadline: Option<Instant>,
}

impl RunRequest {
    pub fn new(scope: ScopeId, content_types: Vec<ContentType>) -> Self {
        Self {
            scope,
            content_types,
            start_id: 0,
            cancel: None,
            deadline: None,
        }
    }

    /// Continue a previously interrupted run.
    pub fn resume(state: &ResumeState) -> Self {
        Self::new(state.scope, state.content_types.clone()).with_start_id(state.next_start_id)
    }

    pub fn with_start_id(mut self, start_id: u64) -> Self {
        self.start_id = start_id;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Why the run must stop at this batch boundary, if it must.
    fn stop_reason(&self) -> Option<SuspendReason> {
        if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
            return Some(SuspendReason::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Some(SuspendReason::DeadlineExceeded);
        }
        None
    }
}

/// Why a run suspended itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendReason {
    MemoryCeiling,
    Cancelled,
    DeadlineExceeded,
}

impl std::fmt::Display for SuspendReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuspendReason::MemoryCeiling => write!(f, "memory ceiling reached"),
            SuspendReason::Cancelled => write!(f, "cancelled"),
            SuspendReason::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

/// Result of a bulk run that did not fail fatally.
#[derive(Debug)]
pub enum RunOutcome {
    /// Every requested content type was synchronized
    Completed { stats: RunStats },

    /// The run stopped itself; resume later from `resume`
    Suspended {
        resume: ResumeState,
        reason: SuspendReason,
        stats: RunStats,
    },

    /// An infrastructure failure aborted the run; retry later from `resume`
    RetryLater {
        resume: ResumeState,
        error: SyncError,
        stats: RunStats,
    },
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. })
    }

    /// Where to pick up again, `None` when completed.
    pub fn resume_state(&self) -> Option<&ResumeState> {
        match self {
            RunOutcome::Completed { .. } => None,
            RunOutcome::Suspended { resume, .. } | RunOutcome::RetryLater { resume, .. } => {
                Some(resume)
            }
        }
    }

    pub fn stats(&self) -> &RunStats {
        match self {
            RunOutcome::Completed { stats }
            | RunOutcome::Suspended { stats, .. }
            | RunOutcome::RetryLater { stats, .. } => stats,
        }
    }
}

/// How one content type's run ended.
enum TypeOutcome {
    Completed,
    Suspended { next_start_id: u64, reason: SuspendReason },
    RetryLater { next_start_id: u64, error: SyncError },
}

/// Turn a retryable failure into a retry-later outcome at `next_start_id`.
fn retry_or_fail(error: impl Into<SyncError>, next_start_id: u64) -> Result<TypeOutcome, SyncError> {
    let error = error.into();
    if error.is_retryable() {
        Ok(TypeOutcome::RetryLater {
            next_start_id,
            error,
        })
    } else {
        Err(error)
    }
}

/// Drives bulk synchronization runs.
pub struct BulkIndexer {
    registry: Arc<BuilderRegistry>,
    client: Arc<dyn WriteClient>,
    memory: Arc<dyn MemoryGate>,
    progress: Arc<dyn ProgressCallback>,
    config: IndexerConfig,
}

impl BulkIndexer {
    pub fn new(
        registry: Arc<BuilderRegistry>,
        client: Arc<dyn WriteClient>,
        config: IndexerConfig,
    ) -> Self {
        Self {
            registry,
            client,
            memory: Arc::new(NoMemoryLimit),
            progress: Arc::new(NoOpProgressCallback),
            config,
        }
    }

    pub fn with_memory_gate(mut self, memory: Arc<dyn MemoryGate>) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    pub fn registry(&self) -> &BuilderRegistry {
        &self.registry
    }

    /// Synchronize every content type in the request, in order.
    pub fn run(&self, request: &RunRequest) -> Result<RunOutcome, SyncError> {
        let started = Instant::now();
        let scope = request.scope;
        let mut stats = RunStats::new();

        // Unknown types fail before anything is written.
        for content_type in &request.content_types {
            self.registry.get(content_type)?;
        }

        info!(
            scope = %scope,
            content_types = ?request.content_types,
            start_id = request.start_id,
            "Starting bulk sync"
        );

        if self.memory.is_exceeded() {
            warn!(scope = %scope, "Memory ceiling reached before run start");
            return Ok(RunOutcome::Suspended {
                resume: ResumeState::new(scope, request.content_types.clone(), request.start_id),
                reason: SuspendReason::MemoryCeiling,
                stats,
            });
        }

        for (index, content_type) in request.content_types.iter().enumerate() {
            let start_id = if index == 0 { request.start_id } else { 0 };
            let remaining = request.content_types[index..].to_vec();

            if let Some(reason) = request.stop_reason() {
                warn!(scope = %scope, content_type = %content_type, reason = %reason, "Suspending bulk sync");
                return Ok(RunOutcome::Suspended {
                    resume: ResumeState::new(scope, remaining, start_id),
                    reason,
                    stats,
                });
            }

            let mut type_stats = RunStats::new();
            let outcome = self.run_type(request, content_type, start_id, &mut type_stats);
            stats.merge(&type_stats);

            match outcome? {
                TypeOutcome::Completed => stats.record_completed_type(),
                TypeOutcome::Suspended {
                    next_start_id,
                    reason,
                } => {
                    warn!(
                        scope = %scope,
                        content_type = %content_type,
                        next_start_id = next_start_id,
                        reason = %reason,
                        "Suspending bulk sync"
                    );
                    return Ok(RunOutcome::Suspended {
                        resume: ResumeState::new(scope, remaining, next_start_id),
                        reason,
                        stats,
                    });
                }
                TypeOutcome::RetryLater {
                    next_start_id,
                    error,
                } => {
                    warn!(
                        scope = %scope,
                        content_type = %content_type,
                        next_start_id = next_start_id,
                        error = %error,
                        "Bulk sync aborted, retry later"
                    );
                    return Ok(RunOutcome::RetryLater {
                        resume: ResumeState::new(scope, remaining, next_start_id),
                        error,
                        stats,
                    });
                }
            }
        }

        info!(
            scope = %scope,
            written = stats.written,
            write_calls = stats.write_calls,
            deletes = stats.deletes.total(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Bulk sync complete"
        );
        Ok(RunOutcome::Completed { stats })
    }

    fn run_type(
        &self,
        request: &RunRequest,
        content_type: &ContentType,
        start_id: u64,
        stats: &mut RunStats,
    ) -> Result<TypeOutcome, SyncError> {
        let scope = request.scope;
        let entry = self.registry.get(content_type)?;
        let builder = entry.builder.clone();

        if !builder.is_indexing_enabled(scope) {
            info!(scope = %scope, content_type = %content_type, "Indexing disabled, removing documents");
            let mut reconciler =
                DeleteReconciler::new(&*self.client, scope, content_type.clone(), DeleteStrategy::Pre);
            let issued = reconciler.issue(DeleteFilter::Pre { from: 0 });
            stats.deletes.merge(&reconciler.counts());
            return match issued {
                Ok(()) => Ok(TypeOutcome::Completed),
                Err(e) => retry_or_fail(e, start_id),
            };
        }

        let mut iterator =
            entry
                .factory
                .create(scope, start_id, builder.clone(), &self.config.iterator)?;

        let potential = match iterator.count_potential_docs() {
            Ok(count) => count,
            Err(e) => return retry_or_fail(e, start_id),
        };
        let strategy = DeleteStrategy::select(potential, self.config.pre_delete_threshold);
        info!(
            scope = %scope,
            content_type = %content_type,
            start_id = start_id,
            potential_docs = potential,
            strategy = %strategy,
            "Starting content type"
        );

        let mut reconciler =
            DeleteReconciler::new(&*self.client, scope, content_type.clone(), strategy);
        let outcome = self.drive(
            request,
            content_type,
            &builder,
            iterator.as_mut(),
            &mut reconciler,
            stats,
        );
        stats.deletes.merge(&reconciler.counts());
        outcome
    }

    fn drive(
        &self,
        request: &RunRequest,
        content_type: &ContentType,
        builder: &Arc<dyn DocumentBuilder>,
        iterator: &mut dyn SourceIterator,
        reconciler: &mut DeleteReconciler<'_>,
        stats: &mut RunStats,
    ) -> Result<TypeOutcome, SyncError> {
        let scope = request.scope;

        if let Err(e) = reconciler.before_iteration(iterator) {
            return retry_or_fail(e, iterator.cursor().current_id);
        }

        let mut stalled = 0usize;
        loop {
            let resume_at = iterator.cursor().current_id;
            if let Some(reason) = request.stop_reason() {
                return Ok(TypeOutcome::Suspended {
                    next_start_id: resume_at,
                    reason,
                });
            }

            let batch = match iterator.get_ids() {
                Ok(Some(batch)) => batch,
                Ok(None) => break,
                Err(e @ SourceError::Transient(_)) => return retry_or_fail(e, resume_at),
                Err(e) => return Err(e.into()),
            };

            if batch.examined == 0 {
                stalled += 1;
                if stalled > self.config.max_stalled_fetches {
                    return Err(SyncError::StalledIteration { attempts: stalled });
                }
                continue;
            }
            stalled = 0;
            stats.record_fetch(
                batch.examined,
                batch.admitted.len(),
                iterator.batch_size(),
                iterator.cursor().current_id,
            );
            debug!(
                scope = %scope,
                content_type = %content_type,
                cursor = batch.start_id,
                last_id = ?batch.last_id,
                examined = batch.examined,
                admitted = batch.admitted.len(),
                batch_size = iterator.batch_size(),
                "Fetched batch"
            );

            if let Err(e) = reconciler.after_fetch(iterator) {
                return retry_or_fail(e, batch.start_id);
            }

            if let Some(outcome) = self.write_batch(scope, builder, &batch, stats)? {
                return Ok(outcome);
            }
            self.progress.on_progress(scope, content_type, stats);
        }

        if let Err(e) = reconciler.after_iteration(iterator) {
            return retry_or_fail(e, iterator.cursor().current_id);
        }

        info!(
            scope = %scope,
            content_type = %content_type,
            fetches = stats.fetches,
            written = stats.written,
            absent = stats.absent,
            build_errors = stats.build_errors,
            batch_size = iterator.batch_size(),
            "Content type complete"
        );
        Ok(TypeOutcome::Completed)
    }

    /// Build and send one fetched batch.
    ///
    /// Returns an outcome when the run has to stop at this batch.
    fn write_batch(
        &self,
        scope: ScopeId,
        builder: &Arc<dyn DocumentBuilder>,
        batch: &Batch,
        stats: &mut RunStats,
    ) -> Result<Option<TypeOutcome>, SyncError> {
        let mut documents = Vec::with_capacity(batch.admitted.len());
        for &id in &batch.admitted {
            match builder.build_document(scope, id) {
                Ok(Some(document)) => {
                    if self.memory.is_exceeded() {
                        debug!(
                            scope = %scope,
                            id = id,
                            discarded = documents.len(),
                            "Memory ceiling reached mid-batch"
                        );
                        return Ok(Some(TypeOutcome::Suspended {
                            next_start_id: batch.start_id,
                            reason: SuspendReason::MemoryCeiling,
                        }));
                    }
                    documents.push(document);
                }
                Ok(None) => stats.record_absent(),
                Err(e) if self.config.continue_on_build_error => {
                    warn!(scope = %scope, id = id, error = %e, "Failed to build document");
                    stats.record_build_error();
                }
                Err(e) => return Err(e.into()),
            }
        }

        if documents.is_empty() {
            return Ok(None);
        }
        debug!(
            scope = %scope,
            documents = documents.len(),
            approx_bytes = documents.iter().map(Document::approx_size).sum::<usize>(),
            "Sending bulk write"
        );
        if let Err(e) = self.client.bulk_write(&documents) {
            return retry_or_fail(e, batch.start_id).map(Some);
        }
        stats.record_write(documents.len());
        Ok(None)
    }
}
