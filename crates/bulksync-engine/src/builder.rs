//! Document builder interface.
//!
//! One builder per content type turns a source id into an index document.
//! Field extraction and cleaning live entirely behind this trait.

use bulksync_types::{ContentType, Document, DocumentIdentity, FieldPatch, ScopeId, UpdatePayload};

use crate::error::BuildError;

/// Per content-type document construction.
pub trait DocumentBuilder: Send + Sync {
    /// Content type this builder produces.
    fn content_type(&self) -> &ContentType;

    /// Whether the content type is indexed at all for this scope.
    ///
    /// When false, bulk runs wipe the type for the scope and skip it.
    fn is_indexing_enabled(&self, _scope: ScopeId) -> bool {
        true
    }

    /// Pure predicate, safe to call speculatively.
    fn is_indexable(&self, scope: ScopeId, id: u64) -> bool;

    /// Build the document, `None` if the item is not indexable right now.
    fn build_document(&self, scope: ScopeId, id: u64) -> Result<Option<Document>, BuildError>;

    /// Deterministic identity for `(scope, id)`.
    fn document_identity(&self, scope: ScopeId, id: u64) -> DocumentIdentity;

    /// Parent item whose document depends on this one (a reply's parent
    /// comment, for instance). `None` for roots.
    fn parent_id(&self, _scope: ScopeId, _id: u64) -> Result<Option<u64>, BuildError> {
        Ok(None)
    }

    /// Translate field patches into a partial-update payload.
    fn apply_update(
        &self,
        _scope: ScopeId,
        _id: u64,
        _patches: &[FieldPatch],
    ) -> Result<UpdatePayload, BuildError> {
        Err(BuildError::Unsupported(format!(
            "{} documents do not support partial updates",
            self.content_type()
        )))
    }
}
