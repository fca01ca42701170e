//! Delete filters used to reconcile stale documents.
//!
//! Filters are range-based so they can be re-applied without side effects.
//! The write client is responsible for turning them into its own query
//! language; [`DeleteFilter::covers`] is the reference semantics.

use serde::{Deserialize, Serialize};

use crate::scope::{ContentType, ScopeId};

/// Which documents of one `(scope, content type)` a delete removes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeleteFilter {
    /// Wipe everything at or above `from` before iteration begins.
    ///
    /// A fresh run starts at 0, which wipes the whole scope.
    Pre { from: u64 },

    /// Inclusive id range reconciled during iteration.
    Ranged { from: u64, to: u64 },

    /// Everything past the final checkpoint, issued once at run end.
    Post {
        from: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<u64>,
    },

    /// Documents whose `field` equals `value` (child cascades).
    Field {
        field: String,
        value: serde_json::Value,
    },
}

impl DeleteFilter {
    /// Whether a document built from source id `id` is removed by this filter.
    ///
    /// `Field` filters are not id based and never match here.
    pub fn covers(&self, id: u64) -> bool {
        match self {
            DeleteFilter::Pre { from } => id >= *from,
            DeleteFilter::Ranged { from, to } => (*from..=*to).contains(&id),
            DeleteFilter::Post { from, to } => id >= *from && to.is_none_or(|to| id <= to),
            DeleteFilter::Field { .. } => false,
        }
    }

    /// Short label for logs and stats.
    pub fn label(&self) -> &'static str {
        match self {
            DeleteFilter::Pre { .. } => "pre",
            DeleteFilter::Ranged { .. } => "ranged",
            DeleteFilter::Post { .. } => "post",
            DeleteFilter::Field { .. } => "field",
        }
    }
}

impl std::fmt::Display for DeleteFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeleteFilter::Pre { from } => write!(f, "pre[{}..)", from),
            DeleteFilter::Ranged { from, to } => write!(f, "ranged[{}..={}]", from, to),
            DeleteFilter::Post { from, to: None } => write!(f, "post[{}..)", from),
            DeleteFilter::Post { from, to: Some(to) } => write!(f, "post[{}..={}]", from, to),
            DeleteFilter::Field { field, value } => write!(f, "field[{}={}]", field, value),
        }
    }
}

/// A delete filter bound to the partition it applies to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub scope: ScopeId,
    pub content_type: ContentType,
    pub filter: DeleteFilter,
}

impl DeleteRequest {
    pub fn new(scope: ScopeId, content_type: ContentType, filter: DeleteFilter) -> Self {
        Self {
            scope,
            content_type,
            filter,
        }
    }
}
