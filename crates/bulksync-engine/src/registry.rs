//! Content-type registry.
//!
//! Maps each content type to its [`DocumentBuilder`] and the
//! [`IteratorFactory`] that scans it, plus cascade rules used when a parent
//! item disappears (a post's comments, for instance).

use std::collections::HashMap;
use std::sync::Arc;

use bulksync_types::ContentType;

use crate::builder::DocumentBuilder;
use crate::error::SyncError;
use crate::iterator::IteratorFactory;

/// Builder and iterator factory for one content type.
#[derive(Clone)]
pub struct RegistryEntry {
    pub builder: Arc<dyn DocumentBuilder>,
    pub factory: Arc<dyn IteratorFactory>,
}

/// Child documents removed together with a parent item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cascade {
    /// Content type of the children
    pub child: ContentType,
    /// Child field holding the parent's source id
    pub parent_field: String,
}

#[derive(Default, Clone)]
pub struct BuilderRegistry {
    entries: HashMap<ContentType, RegistryEntry>,
    cascades: HashMap<ContentType, Vec<Cascade>>,
}

impl BuilderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a builder under its own content type, replacing any previous one.
    pub fn register(
        &mut self,
        builder: Arc<dyn DocumentBuilder>,
        factory: Arc<dyn IteratorFactory>,
    ) -> &mut Self {
        let content_type = builder.content_type().clone();
        self.entries
            .insert(content_type, RegistryEntry { builder, factory });
        self
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(
        mut self,
        builder: Arc<dyn DocumentBuilder>,
        factory: Arc<dyn IteratorFactory>,
    ) -> Self {
        self.register(builder, factory);
        self
    }

    /// Remove `child` documents whose `parent_field` equals the parent's id
    /// when a `parent` item is deleted.
    pub fn with_cascade(
        mut self,
        parent: impl Into<ContentType>,
        child: impl Into<ContentType>,
        parent_field: impl Into<String>,
    ) -> Self {
        self.cascades
            .entry(parent.into())
            .or_default()
            .push(Cascade {
                child: child.into(),
                parent_field: parent_field.into(),
            });
        self
    }

    pub fn get(&self, content_type: &ContentType) -> Result<&RegistryEntry, SyncError> {
        self.entries
            .get(content_type)
            .ok_or_else(|| SyncError::MissingBuilder(content_type.clone()))
    }

    pub fn builder(&self, content_type: &ContentType) -> Result<Arc<dyn DocumentBuilder>, SyncError> {
        self.get(content_type).map(|entry| entry.builder.clone())
    }

    pub fn contains(&self, content_type: &ContentType) -> bool {
        self.entries.contains_key(content_type)
    }

    pub fn cascades_for(&self, parent: &ContentType) -> &[Cascade] {
        self.cascades.get(parent).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Registered content types, sorted by name.
    pub fn content_types(&self) -> Vec<ContentType> {
        let mut types: Vec<ContentType> = self.entries.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulksync_types::{Document, DocumentIdentity, ScopeId};

    use crate::error::BuildError;
    use crate::iterator::EmptyFactory;

    struct Named(ContentType);

    impl DocumentBuilder for Named {
        fn content_type(&self) -> &ContentType {
            &self.0
        }

        fn is_indexable(&self, _scope: ScopeId, _id: u64) -> bool {
            true
        }

        fn build_document(&self, _scope: ScopeId, _id: u64) -> Result<Option<Document>, BuildError> {
            Ok(None)
        }

        fn document_identity(&self, scope: ScopeId, id: u64) -> DocumentIdentity {
            DocumentIdentity::derive(scope, "x", id, self.0.as_str())
        }
    }

    fn registry() -> BuilderRegistry {
        BuilderRegistry::new()
            .with(Arc::new(Named("post".into())), Arc::new(EmptyFactory))
            .with(Arc::new(Named("comment".into())), Arc::new(EmptyFactory))
            .with_cascade("post", "comment", "post_id")
    }

    #[test]
    fn test_lookup() {
        let registry = registry();
        assert_eq!(registry.len(), 2);
        assert!(registry.contains(&"post".into()));
        assert_eq!(
            registry.builder(&"comment".into()).unwrap().content_type(),
            &ContentType::new("comment")
        );
        assert_eq!(
            registry.content_types(),
            vec![ContentType::new("comment"), ContentType::new("post")]
        );
    }

    #[test]
    fn test_missing_builder_is_fatal() {
        let registry = registry();
        let err = registry.get(&"page".into()).err().unwrap();
        assert!(matches!(err, SyncError::MissingBuilder(ref t) if t.as_str() == "page"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_cascades() {
        let registry = registry();
        assert_eq!(
            registry.cascades_for(&"post".into()),
            &[Cascade {
                child: "comment".into(),
                parent_field: "post_id".to_string(),
            }]
        );
        assert!(registry.cascades_for(&"comment".into()).is_empty());
    }
}
