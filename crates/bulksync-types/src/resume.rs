//! Resumption state handed back to the caller.
//!
//! The engine never persists this itself. A caller that stores
//! `{scope, content_types, next_start_id}` can resume a suspended or aborted
//! run exactly where it left off.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypesError;
use crate::scope::{ContentType, ScopeId};

/// Where an interrupted run should pick up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeState {
    /// Scope being synchronized
    pub scope: ScopeId,

    /// Content types still to process; the first one is the interrupted type
    pub content_types: Vec<ContentType>,

    /// Start id for the first content type (later types start at 0)
    pub next_start_id: u64,

    /// When the run was interrupted (milliseconds since epoch for JSON compatibility)
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl ResumeState {
    pub fn new(scope: ScopeId, content_types: Vec<ContentType>, next_start_id: u64) -> Self {
        Self {
            scope,
            content_types,
            next_start_id,
            created_at: Utc::now(),
        }
    }

    /// The content type the run was working on when it stopped.
    pub fn content_type(&self) -> Option<&ContentType> {
        self.content_types.first()
    }

    /// Serialize to JSON bytes for storage
    pub fn to_bytes(&self) -> Result<Vec<u8>, TypesError> {
        serde_json::to_vec(self).map_err(TypesError::from)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TypesError> {
        serde_json::from_slice(bytes).map_err(TypesError::from)
    }
}
