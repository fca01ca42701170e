//! Index documents and their identities.

use serde::{Deserialize, Serialize};

use crate::scope::ScopeId;

/// Where a document lives in the index.
///
/// Identities are derived deterministically from `(scope, id)` so a
/// re-run writes over the same document instead of creating a copy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentIdentity {
    /// Index-level document id
    pub doc_id: String,

    /// Document type within the index (usually the content type)
    pub doc_type: String,

    /// Routing key for parent/child placement, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<String>,
}

impl DocumentIdentity {
    pub fn new(doc_id: impl Into<String>, doc_type: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            doc_type: doc_type.into(),
            routing: None,
        }
    }

    /// Derive the conventional `<scope>-<tag>-<id>` identity.
    pub fn derive(scope: ScopeId, tag: &str, id: u64, doc_type: impl Into<String>) -> Self {
        Self::new(format!("{}-{}-{}", scope, tag, id), doc_type)
    }

    pub fn with_routing(mut self, routing: impl Into<String>) -> Self {
        self.routing = Some(routing.into());
        self
    }
}

/// A fully built document ready for a bulk write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Identity used for upserts and deletes
    pub identity: DocumentIdentity,

    /// Source row id the document was built from
    pub source_id: u64,

    /// Field payload
    pub body: serde_json::Value,
}

impl Document {
    pub fn new(identity: DocumentIdentity, source_id: u64, body: serde_json::Value) -> Self {
        Self {
            identity,
            source_id,
            body,
        }
    }

    /// Approximate serialized size, for logging bulk payloads.
    pub fn approx_size(&self) -> usize {
        serde_json::to_vec(&self.body).map(|v| v.len()).unwrap_or(0)
    }
}

/// A partial-update payload produced by a document builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePayload {
    /// Fields (or script parameters) to merge into the stored document
    pub fields: serde_json::Map<String, serde_json::Value>,

    /// Optional update script understood by the write client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
}

impl UpdatePayload {
    pub fn fields(fields: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            fields,
            script: None,
        }
    }

    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.script = Some(script.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.script.is_none()
    }
}
