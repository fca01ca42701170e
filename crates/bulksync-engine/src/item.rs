//! Single-item synchronization.
//!
//! Outside of bulk runs, individual items are kept in sync by typed
//! [`ItemCommand`]s as the source changes. Commands are resolved against the
//! registered [`DocumentBuilder`](crate::builder::DocumentBuilder) for the
//! item's content type.

use std::sync::Arc;

use bulksync_types::{
    ContentType, DeleteFilter, DeleteRequest, FieldPatch, ItemCommand, ScopeId, Settings,
};
use serde_json::Value;
use tracing::{debug, info};

use crate::ancestry::collect_ancestors;
use crate::client::WriteClient;
use crate::error::{BuildError, SyncError};
use crate::registry::BuilderRegistry;

/// What a command did to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Document built and upserted
    Indexed,
    /// Nothing to do (no document, or indexing disabled)
    Skipped,
    /// Document removed, plus `cascaded` child delete filters
    Deleted { cascaded: usize },
    /// Stored document partially updated
    Updated,
}

/// Executes [`ItemCommand`]s against the index.
pub struct ItemSync {
    registry: Arc<BuilderRegistry>,
    client: Arc<dyn WriteClient>,
    ancestry_max_depth: usize,
}

impl ItemSync {
    pub fn new(registry: Arc<BuilderRegistry>, client: Arc<dyn WriteClient>) -> Self {
        Self {
            registry,
            client,
            ancestry_max_depth: 64,
        }
    }

    /// Build with the ancestry depth from `settings`.
    pub fn from_settings(
        registry: Arc<BuilderRegistry>,
        client: Arc<dyn WriteClient>,
        settings: &Settings,
    ) -> Self {
        Self::new(registry, client).with_ancestry_max_depth(settings.ancestry_max_depth)
    }

    pub fn ancestry_max_depth(&self) -> usize {
        self.ancestry_max_depth
    }

    /// Cap ancestor walks at `depth` parents.
    pub fn with_ancestry_max_depth(mut self, depth: usize) -> Self {
        self.ancestry_max_depth = depth;
        self
    }

    pub fn execute(
        &self,
        scope: ScopeId,
        content_type: &ContentType,
        id: u64,
        command: &ItemCommand,
    ) -> Result<ItemOutcome, SyncError> {
        debug!(
            scope = %scope,
            content_type = %content_type,
            id = id,
            command = command.name(),
            "Executing item command"
        );
        match command {
            ItemCommand::Index => self.index(scope, content_type, id),
            ItemCommand::Delete => self.delete(scope, content_type, id),
            ItemCommand::Update(patches) => self.update(scope, content_type, id, patches),
        }
    }

    /// Index an item and every ancestor whose document depends on it.
    ///
    /// Returns one outcome per item, the item itself first.
    pub fn index_with_ancestors(
        &self,
        scope: ScopeId,
        content_type: &ContentType,
        id: u64,
    ) -> Result<Vec<(u64, ItemOutcome)>, SyncError> {
        let builder = self.registry.builder(content_type)?;
        let ancestors = collect_ancestors(id, self.ancestry_max_depth, |n| {
            builder.parent_id(scope, n)
        })?;

        let mut outcomes = Vec::with_capacity(ancestors.len() + 1);
        for item in std::iter::once(id).chain(ancestors) {
            let outcome = self.index(scope, content_type, item)?;
            outcomes.push((item, outcome));
        }
        Ok(outcomes)
    }

    fn index(
        &self,
        scope: ScopeId,
        content_type: &ContentType,
        id: u64,
    ) -> Result<ItemOutcome, SyncError> {
        let builder = self.registry.builder(content_type)?;
        if !builder.is_indexing_enabled(scope) {
            return Ok(ItemOutcome::Skipped);
        }
        if !builder.is_indexable(scope, id) {
            return self.delete(scope, content_type, id);
        }
        match builder.build_document(scope, id)? {
            Some(document) => {
                self.client.bulk_write(std::slice::from_ref(&document))?;
                Ok(ItemOutcome::Indexed)
            }
            None => Ok(ItemOutcome::Skipped),
        }
    }

    fn delete(
        &self,
        scope: ScopeId,
        content_type: &ContentType,
        id: u64,
    ) -> Result<ItemOutcome, SyncError> {
        let builder = self.registry.builder(content_type)?;
        self.client
            .delete_document(&builder.document_identity(scope, id))?;

        let cascades = self.registry.cascades_for(content_type);
        for cascade in cascades {
            let request = DeleteRequest::new(
                scope,
                cascade.child.clone(),
                DeleteFilter::Field {
                    field: cascade.parent_field.clone(),
                    value: Value::from(id),
                },
            );
            self.client.delete_by_filter(&request)?;
        }

        info!(
            scope = %scope,
            content_type = %content_type,
            id = id,
            cascaded = cascades.len(),
            "Deleted document"
        );
        Ok(ItemOutcome::Deleted {
            cascaded: cascades.len(),
        })
    }

    fn update(
        &self,
        scope: ScopeId,
        content_type: &ContentType,
        id: u64,
        patches: &[FieldPatch],
    ) -> Result<ItemOutcome, SyncError> {
        let builder = self.registry.builder(content_type)?;
        if !builder.is_indexing_enabled(scope) {
            return Ok(ItemOutcome::Skipped);
        }
        let identity = builder.document_identity(scope, id);

        let Some(mut stored) = self.client.get_document(&identity)? else {
            debug!(scope = %scope, id = id, "Document not indexed yet, indexing instead");
            return self.index(scope, content_type, id);
        };

        match builder.apply_update(scope, id, patches) {
            Ok(payload) if payload.is_empty() => Ok(ItemOutcome::Skipped),
            Ok(payload) => {
                self.client.update_document(&identity, &payload)?;
                Ok(ItemOutcome::Updated)
            }
            // Patch the stored copy and write it back whole.
            Err(BuildError::Unsupported(_)) => {
                for patch in patches {
                    patch.apply_to(&mut stored.body);
                }
                self.client.bulk_write(std::slice::from_ref(&stored))?;
                Ok(ItemOutcome::Updated)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulksync_types::{Document, DocumentIdentity, PatchOp, UpdatePayload};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use crate::builder::DocumentBuilder;
    use crate::client::WriteError;
    use crate::iterator::EmptyFactory;

    /// Comments 1..=5, odd ids indexable; each comment replies to `id - 1`.
    struct Comments {
        content_type: ContentType,
        partial_updates: bool,
    }

    impl DocumentBuilder for Comments {
        fn content_type(&self) -> &ContentType {
            &self.content_type
        }

        fn is_indexable(&self, _scope: ScopeId, id: u64) -> bool {
            id % 2 == 1
        }

        fn build_document(&self, scope: ScopeId, id: u64) -> Result<Option<Document>, BuildError> {
            if id > 5 {
                return Ok(None);
            }
            Ok(Some(Document::new(
                self.document_identity(scope, id),
                id,
                json!({ "id": id, "likes": 0 }),
            )))
        }

        fn document_identity(&self, scope: ScopeId, id: u64) -> DocumentIdentity {
            DocumentIdentity::derive(scope, "c", id, "comment").with_routing(scope.to_string())
        }

        fn parent_id(&self, _scope: ScopeId, id: u64) -> Result<Option<u64>, BuildError> {
            Ok(id.checked_sub(1).filter(|p| *p > 0))
        }

        fn apply_update(
            &self,
            _scope: ScopeId,
            _id: u64,
            patches: &[FieldPatch],
        ) -> Result<UpdatePayload, BuildError> {
            if !self.partial_updates {
                return Err(BuildError::Unsupported("comment".into()));
            }
            let mut fields = serde_json::Map::new();
            for patch in patches {
                if let PatchOp::Set(v) = &patch.op {
                    fields.insert(patch.field.clone(), v.clone());
                }
            }
            Ok(UpdatePayload::fields(fields))
        }
    }

    #[derive(Default)]
    struct Index {
        docs: Mutex<HashMap<String, Document>>,
        filters: Mutex<Vec<DeleteRequest>>,
        updates: Mutex<Vec<(DocumentIdentity, UpdatePayload)>>,
    }

    impl WriteClient for Index {
        fn bulk_write(&self, documents: &[Document]) -> Result<(), WriteError> {
            let mut docs = self.docs.lock().unwrap();
            for d in documents {
                docs.insert(d.identity.doc_id.clone(), d.clone());
            }
            Ok(())
        }

        fn delete_by_filter(&self, request: &DeleteRequest) -> Result<(), WriteError> {
            self.filters.lock().unwrap().push(request.clone());
            Ok(())
        }

        fn get_document(&self, identity: &DocumentIdentity) -> Result<Option<Document>, WriteError> {
            Ok(self.docs.lock().unwrap().get(&identity.doc_id).cloned())
        }

        fn delete_document(&self, identity: &DocumentIdentity) -> Result<(), WriteError> {
            self.docs.lock().unwrap().remove(&identity.doc_id);
            Ok(())
        }

        fn update_document(
            &self,
            identity: &DocumentIdentity,
            payload: &UpdatePayload,
        ) -> Result<(), WriteError> {
            self.updates
                .lock()
                .unwrap()
                .push((identity.clone(), payload.clone()));
            Ok(())
        }
    }

    fn sync(partial_updates: bool) -> (ItemSync, Arc<Index>) {
        let registry = BuilderRegistry::new()
            .with(
                Arc::new(Comments {
                    content_type: "comment".into(),
                    partial_updates,
                }),
                Arc::new(EmptyFactory),
            )
            .with_cascade("comment", "reaction", "comment_id");
        let index = Arc::new(Index::default());
        (ItemSync::new(Arc::new(registry), index.clone()), index)
    }

    const SCOPE: ScopeId = ScopeId::new(8);

    #[test]
    fn test_index_and_delete() {
        let (sync, index) = sync(true);
        let comment = ContentType::new("comment");

        assert_eq!(
            sync.execute(SCOPE, &comment, 3, &ItemCommand::Index).unwrap(),
            ItemOutcome::Indexed
        );
        assert!(index.docs.lock().unwrap().contains_key("8-c-3"));

        assert_eq!(
            sync.execute(SCOPE, &comment, 3, &ItemCommand::Delete).unwrap(),
            ItemOutcome::Deleted { cascaded: 1 }
        );
        assert!(index.docs.lock().unwrap().is_empty());

        let filters = index.filters.lock().unwrap();
        assert_eq!(filters[0].content_type, ContentType::new("reaction"));
        assert_eq!(
            filters[0].filter,
            DeleteFilter::Field {
                field: "comment_id".into(),
                value: json!(3)
            }
        );
    }

    #[test]
    fn test_index_not_indexable_deletes() {
        let (sync, _index) = sync(true);
        let outcome = sync
            .execute(SCOPE, &"comment".into(), 2, &ItemCommand::Index)
            .unwrap();
        assert_eq!(outcome, ItemOutcome::Deleted { cascaded: 1 });
    }

    #[test]
    fn test_index_absent_document_skips() {
        let (sync, index) = sync(true);
        let outcome = sync
            .execute(SCOPE, &"comment".into(), 7, &ItemCommand::Index)
            .unwrap();
        assert_eq!(outcome, ItemOutcome::Skipped);
        assert!(index.docs.lock().unwrap().is_empty());
    }

    #[test]
    fn test_update_falls_back_to_index() {
        let (sync, index) = sync(true);
        let patches = vec![FieldPatch::new("likes", PatchOp::Set(json!(2)))];
        let outcome = sync
            .execute(SCOPE, &"comment".into(), 5, &ItemCommand::Update(patches))
            .unwrap();
        assert_eq!(outcome, ItemOutcome::Indexed);
        assert!(index.updates.lock().unwrap().is_empty());
    }

    #[test]
    fn test_update_uses_partial_payload() {
        let (sync, index) = sync(true);
        let comment = ContentType::new("comment");
        sync.execute(SCOPE, &comment, 5, &ItemCommand::Index).unwrap();

        let patches = vec![FieldPatch::new("likes", PatchOp::Set(json!(2)))];
        let outcome = sync
            .execute(SCOPE, &comment, 5, &ItemCommand::Update(patches))
            .unwrap();
        assert_eq!(outcome, ItemOutcome::Updated);

        let updates = index.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0.routing.as_deref(), Some("8"));
        assert_eq!(updates[0].1.fields.get("likes"), Some(&json!(2)));
    }

    #[test]
    fn test_update_without_partial_support_rewrites_document() {
        let (sync, index) = sync(false);
        let comment = ContentType::new("comment");
        sync.execute(SCOPE, &comment, 1, &ItemCommand::Index).unwrap();

        let patches = vec![FieldPatch::new("likes", PatchOp::Increment(3))];
        let outcome = sync
            .execute(SCOPE, &comment, 1, &ItemCommand::Update(patches))
            .unwrap();
        assert_eq!(outcome, ItemOutcome::Updated);
        assert_eq!(
            index.docs.lock().unwrap()["8-c-1"].body,
            json!({ "id": 1, "likes": 3 })
        );
    }

    #[test]
    fn test_index_with_ancestors() {
        let (sync, _index) = sync(true);
        let outcomes = sync
            .with_ancestry_max_depth(2)
            .index_with_ancestors(SCOPE, &"comment".into(), 5)
            .unwrap();
        assert_eq!(
            outcomes,
            vec![
                (5, ItemOutcome::Indexed),
                (4, ItemOutcome::Deleted { cascaded: 1 }),
                (3, ItemOutcome::Indexed),
            ]
        );
    }

    #[test]
    fn test_from_settings_caps_ancestry() {
        let (default_sync, index) = sync(true);
        assert_eq!(default_sync.ancestry_max_depth(), 64);

        let settings = Settings {
            ancestry_max_depth: 1,
            ..Settings::default()
        };
        let sync = ItemSync::from_settings(default_sync.registry.clone(), index, &settings);
        assert_eq!(sync.ancestry_max_depth(), 1);

        let outcomes = sync
            .index_with_ancestors(SCOPE, &"comment".into(), 5)
            .unwrap();
        assert_eq!(
            outcomes,
            vec![(5, ItemOutcome::Indexed), (4, ItemOutcome::Deleted { cascaded: 1 })]
        );
    }

    #[test]
    fn test_unknown_type() {
        let (sync, _index) = sync(true);
        let err = sync
            .execute(SCOPE, &"forum".into(), 1, &ItemCommand::Index)
            .unwrap_err();
        assert!(matches!(err, SyncError::MissingBuilder(_)));
    }
}
