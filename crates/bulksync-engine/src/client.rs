//! Write client interface for the index cluster.
//!
//! The engine never speaks the cluster's wire protocol. A [`WriteClient`]
//! implementation does, and reports failures through [`WriteError`] so the
//! orchestrator can decide between "retry later" and "surface and stop".

use bulksync_types::{DeleteRequest, Document, DocumentIdentity, UpdatePayload};
use thiserror::Error;

/// Failures reported by the index cluster.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WriteError {
    /// No server could be reached
    #[error("cluster unreachable: {0}")]
    ClusterUnreachable(String),

    /// The index is blocked for writes
    #[error("cluster read-only: {0}")]
    ClusterReadOnly(String),

    /// A shard could not be reached for the operation
    #[error("shard unavailable: {0}")]
    ShardUnavailable(String),

    /// The request itself was rejected
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// A document conflicts with the index mapping
    #[error("mapping conflict: {0}")]
    MappingConflict(String),
}

impl WriteError {
    /// Infrastructure failures abort the run and are retried later.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            WriteError::ClusterUnreachable(_)
                | WriteError::ClusterReadOnly(_)
                | WriteError::ShardUnavailable(_)
        )
    }

    /// Map a raw response-error message onto the taxonomy.
    ///
    /// Intended for client implementations whose transport only hands back
    /// error text. Connection-level failures should be reported as
    /// [`WriteError::ClusterUnreachable`] directly.
    pub fn classify(message: &str) -> WriteError {
        let msg = message.to_string();
        if message.contains("ClusterBlockException") {
            WriteError::ClusterReadOnly(msg)
        } else if message.contains("UnavailableShardsException")
            || message.contains("NoShardAvailableActionException")
        {
            WriteError::ShardUnavailable(msg)
        } else if message.contains("MapperParsingException")
            || message.contains("IllegalArgumentException: mapper")
            || message.contains("mapper_parsing_exception")
        {
            WriteError::MappingConflict(msg)
        } else {
            WriteError::MalformedRequest(msg)
        }
    }
}

/// Bulk and single-document operations against the index cluster.
pub trait WriteClient: Send + Sync {
    /// Upsert a batch of documents in one call.
    fn bulk_write(&self, documents: &[Document]) -> Result<(), WriteError>;

    /// Remove every document matched by the filter.
    fn delete_by_filter(&self, request: &DeleteRequest) -> Result<(), WriteError>;

    /// Fetch a stored document, `None` when absent.
    fn get_document(&self, identity: &DocumentIdentity) -> Result<Option<Document>, WriteError>;

    /// Remove a single document by identity. Missing documents are not an error.
    fn delete_document(&self, identity: &DocumentIdentity) -> Result<(), WriteError>;

    /// Apply a partial update to a stored document.
    fn update_document(
        &self,
        identity: &DocumentIdentity,
        payload: &UpdatePayload,
    ) -> Result<(), WriteError>;
}
