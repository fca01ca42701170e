//! Async job wrapper around [`BulkIndexer::run`].
//!
//! The engine is synchronous and blocks on every collaborator call, so a job
//! moves the run onto tokio's blocking pool. The job claims its
//! `(scope, content type)` pairs in [`RunLocks`] first and skips the run if
//! any of them is already being synchronized.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::indexer::{BulkIndexer, RunOutcome, RunRequest};
use crate::run_lock::RunLocks;

/// Configuration for sync jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJobConfig {
    /// Wall-clock budget per run in seconds (default: 300). 0 disables it.
    ///
    /// A run that exceeds it suspends at the next batch boundary.
    pub timeout_secs: u64,
}

impl Default for SyncJobConfig {
    fn default() -> Self {
        Self { timeout_secs: 300 }
    }
}

impl SyncJobConfig {
    /// Set the timeout in seconds.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Result of a job invocation.
#[derive(Debug)]
pub enum JobResult {
    /// The run executed
    Ran(RunOutcome),
    /// Another run holds one of the requested pairs
    Skipped,
}

/// Run one request on the blocking pool.
///
/// `cancel` is forwarded to the run and checked at batch boundaries.
pub async fn run_sync_job(
    indexer: Arc<BulkIndexer>,
    locks: &RunLocks,
    request: RunRequest,
    config: &SyncJobConfig,
    cancel: CancellationToken,
) -> Result<JobResult, SyncError> {
    let Some(guard) = locks.try_acquire_all(request.scope, &request.content_types) else {
        info!(
            scope = %request.scope,
            content_types = ?request.content_types,
            "Sync already running, skipping"
        );
        return Ok(JobResult::Skipped);
    };

    let mut request = request.with_cancellation(cancel);
    if let Some(timeout) = config.timeout() {
        let deadline = Instant::now() + timeout;
        request.deadline = Some(request.deadline.map_or(deadline, |d| d.min(deadline)));
    }

    debug!(scope = %request.scope, "Starting sync job");
    let outcome = tokio::task::spawn_blocking(move || {
        let _guard = guard;
        indexer.run(&request)
    })
    .await
    .map_err(|e| SyncError::TaskFailed(e.to_string()))?;

    match &outcome {
        Ok(RunOutcome::Completed { stats }) => {
            info!(written = stats.written, "Sync job complete");
        }
        Ok(other) => {
            if let Some(resume) = other.resume_state() {
                info!(next_start_id = resume.next_start_id, "Sync job interrupted");
            }
        }
        Err(e) => warn!(error = %e, "Sync job failed"),
    }

    outcome.map(JobResult::Ran)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulksync_types::{
        ContentType, DeleteRequest, Document, DocumentIdentity, ScopeId, UpdatePayload,
    };

    use crate::builder::DocumentBuilder;
    use crate::client::{WriteClient, WriteError};
    use crate::error::BuildError;
    use crate::indexer::{IndexerConfig, SuspendReason};
    use crate::iterator::SingleDocumentFactory;
    use crate::registry::BuilderRegistry;

    struct Site(ContentType);

    impl DocumentBuilder for Site {
        fn content_type(&self) -> &ContentType {
            &self.0
        }

        fn is_indexable(&self, _scope: ScopeId, _id: u64) -> bool {
            true
        }

        fn build_document(&self, scope: ScopeId, id: u64) -> Result<Option<Document>, BuildError> {
            Ok(Some(Document::new(
                self.document_identity(scope, id),
                id,
                serde_json::json!({ "site": id }),
            )))
        }

        fn document_identity(&self, scope: ScopeId, id: u64) -> DocumentIdentity {
            DocumentIdentity::derive(scope, "site", id, "site")
        }
    }

    struct Sink;

    impl WriteClient for Sink {
        fn bulk_write(&self, _documents: &[Document]) -> Result<(), WriteError> {
            Ok(())
        }

        fn delete_by_filter(&self, _request: &DeleteRequest) -> Result<(), WriteError> {
            Ok(())
        }

        fn get_document(&self, _identity: &DocumentIdentity) -> Result<Option<Document>, WriteError> {
            Ok(None)
        }

        fn delete_document(&self, _identity: &DocumentIdentity) -> Result<(), WriteError> {
            Ok(())
        }

        fn update_document(
            &self,
            _identity: &DocumentIdentity,
            _payload: &UpdatePayload,
        ) -> Result<(), WriteError> {
            Ok(())
        }
    }

    fn indexer() -> Arc<BulkIndexer> {
        let registry = BuilderRegistry::new()
            .with(Arc::new(Site("site".into())), Arc::new(SingleDocumentFactory));
        Arc::new(BulkIndexer::new(
            Arc::new(registry),
            Arc::new(Sink),
            IndexerConfig::default(),
        ))
    }

    fn request() -> RunRequest {
        RunRequest::new(ScopeId::new(12), vec!["site".into()])
    }

    #[test]
    fn test_default_config() {
        let config = SyncJobConfig::default();
        assert_eq!(config.timeout_secs, 300);
        assert_eq!(config.timeout(), Some(Duration::from_secs(300)));
        assert_eq!(config.with_timeout(0).timeout(), None);
    }

    #[tokio::test]
    async fn test_job_runs_and_releases_lock() {
        let locks = RunLocks::new();
        let result = run_sync_job(
            indexer(),
            &locks,
            request(),
            &SyncJobConfig::default(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        match result {
            JobResult::Ran(outcome) => {
                assert!(outcome.is_completed());
                assert_eq!(outcome.stats().written, 1);
            }
            JobResult::Skipped => panic!("job should have run"),
        }
        assert!(!locks.is_running(ScopeId::new(12), &"site".into()));
    }

    #[tokio::test]
    async fn test_job_skips_when_locked() {
        let locks = RunLocks::new();
        let _held = locks.try_acquire(ScopeId::new(12), &"site".into()).unwrap();
        let result = run_sync_job(
            indexer(),
            &locks,
            request(),
            &SyncJobConfig::default(),
            CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(matches!(result, JobResult::Skipped));
    }

    #[tokio::test]
    async fn test_cancelled_job_suspends() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = run_sync_job(
            indexer(),
            &RunLocks::new(),
            request(),
            &SyncJobConfig::default(),
            cancel,
        )
        .await
        .unwrap();

        match result {
            JobResult::Ran(RunOutcome::Suspended { reason, .. }) => {
                assert_eq!(reason, SuspendReason::Cancelled)
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
