//! Error types for the synchronization engine.
//!
//! Every failure the orchestrator surfaces is a [`SyncError`] with a
//! [`ErrorKind`]: transient failures are retried later by the caller from the
//! last checkpoint, fatal ones are not retried.

use bulksync_types::{ContentType, TypesError};
use thiserror::Error;

use crate::client::WriteError;

/// Whether a failure is worth retrying later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Infrastructure hiccup; retry the whole content type later
    Transient,
    /// Broken configuration, query, or request; never auto-retried
    Fatal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::Fatal => write!(f, "fatal"),
        }
    }
}

/// Failures reading ids from the source.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The fetch failed but the cursor is unchanged; safe to retry
    #[error("Transient source error: {0}")]
    Transient(String),

    /// The query itself is broken
    #[error("Source error: {0}")]
    Fatal(String),
}

/// Failures building a single document.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// The builder does not support the requested operation
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Building failed for this item
    #[error("Build failed: {0}")]
    Failed(String),
}

/// Errors surfaced by the synchronization engine
#[derive(Debug, Error)]
pub enum SyncError {
    /// Index cluster rejected or could not serve a write
    #[error("Write error: {0}")]
    Write(#[from] WriteError),

    /// Source id fetch failed
    #[error("{0}")]
    Source(#[from] SourceError),

    /// Document builder failed
    #[error("{0}")]
    Build(#[from] BuildError),

    /// No document builder registered for the content type
    #[error("No document builder registered for content type '{0}'")]
    MissingBuilder(ContentType),

    /// Iterator could not be created for the run
    #[error("Iterator init error: {0}")]
    IteratorInit(String),

    /// Repeated fetches examined nothing without reaching the end
    #[error("Iteration stalled: {attempts} consecutive fetches examined no rows")]
    StalledIteration { attempts: usize },

    /// The blocking task running a sync panicked or was aborted
    #[error("Sync task failed: {0}")]
    TaskFailed(String),

    /// Shared type error (config, serialization)
    #[error(transparent)]
    Types(#[from] TypesError),
}

impl SyncError {
    /// Classify the error for retry decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Write(e) if e.is_infrastructure() => ErrorKind::Transient,
            SyncError::Source(SourceError::Transient(_)) => ErrorKind::Transient,
            _ => ErrorKind::Fatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}
