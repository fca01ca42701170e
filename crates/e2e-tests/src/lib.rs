//! End-to-end test infrastructure for bulksync.
//!
//! Provides in-memory collaborators and a shared TestHarness for driving
//! full bulk runs: an id source, a document builder with a configurable
//! admission predicate, a write client that keeps an in-memory index and an
//! ordered log of every call, and a scripted memory gate.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};

use bulksync_engine::{
    BuildError, BuilderRegistry, BulkIndexer, DocumentBuilder, IdSource, IndexerConfig,
    MemoryGate, MemoryReading, RunOutcome, RunRequest, ScanFactory, SourceError, WriteClient,
    WriteError,
};
use bulksync_types::{
    ContentType, DeleteFilter, DeleteRequest, Document, DocumentIdentity, ScopeId, UpdatePayload,
};

/// Scope used by harness runs.
pub const SCOPE: ScopeId = ScopeId::new(1);

/// Source table held in memory.
pub struct MemorySource {
    rows: Mutex<BTreeSet<u64>>,
    fetch_calls: AtomicUsize,
}

impl MemorySource {
    pub fn new(ids: impl IntoIterator<Item = u64>) -> Self {
        Self {
            rows: Mutex::new(ids.into_iter().collect()),
            fetch_calls: AtomicUsize::new(0),
        }
    }

    /// Ids `0..n`.
    pub fn sequential(n: u64) -> Self {
        Self::new(0..n)
    }

    /// Delete source rows.
    pub fn remove(&self, ids: impl IntoIterator<Item = u64>) {
        let mut rows = self.rows.lock().unwrap();
        for id in ids {
            rows.remove(&id);
        }
    }

    pub fn ids(&self) -> BTreeSet<u64> {
        self.rows.lock().unwrap().clone()
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

impl IdSource for MemorySource {
    fn count(&self, _scope: ScopeId, from_id: u64) -> Result<u64, SourceError> {
        Ok(self.rows.lock().unwrap().range(from_id..).count() as u64)
    }

    fn fetch_ids(
        &self,
        _scope: ScopeId,
        from_id: u64,
        limit: usize,
    ) -> Result<Vec<u64>, SourceError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .rows
            .lock()
            .unwrap()
            .range(from_id..)
            .take(limit)
            .copied()
            .collect())
    }
}

type Predicate = Box<dyn Fn(u64) -> bool + Send + Sync>;

/// Document builder whose admission is a plain predicate over ids.
pub struct FakeBuilder {
    content_type: ContentType,
    admit: Predicate,
    parent_field: Option<(String, Box<dyn Fn(u64) -> u64 + Send + Sync>)>,
    enabled: bool,
    build_calls: AtomicUsize,
}

impl FakeBuilder {
    /// Admits every id.
    pub fn all(content_type: &str) -> Self {
        Self::with_predicate(content_type, |_| true)
    }

    pub fn with_predicate(
        content_type: &str,
        admit: impl Fn(u64) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            content_type: ContentType::new(content_type),
            admit: Box::new(admit),
            parent_field: None,
            enabled: true,
            build_calls: AtomicUsize::new(0),
        }
    }

    /// Admits ids divisible by `n`.
    pub fn every_nth(content_type: &str, n: u64) -> Self {
        Self::with_predicate(content_type, move |id| id % n == 0)
    }

    /// Admits each id of `0..n` with probability `ratio`, fixed by `seed`.
    pub fn random(content_type: &str, n: u64, ratio: f64, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let admitted: HashSet<u64> = (0..n).filter(|_| rng.random_bool(ratio)).collect();
        Self::with_predicate(content_type, move |id| admitted.contains(&id))
    }

    /// Store `field = parent(id)` in every document body.
    pub fn with_parent_field(
        mut self,
        field: &str,
        parent: impl Fn(u64) -> u64 + Send + Sync + 'static,
    ) -> Self {
        self.parent_field = Some((field.to_string(), Box::new(parent)));
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn build_calls(&self) -> usize {
        self.build_calls.load(Ordering::SeqCst)
    }

    /// The body this builder produces for `id`.
    pub fn body(&self, id: u64) -> Value {
        let mut body = json!({ "id": id, "type": self.content_type.as_str() });
        if let Some((field, parent)) = &self.parent_field {
            body[field.as_str()] = json!(parent(id));
        }
        body
    }
}

impl DocumentBuilder for FakeBuilder {
    fn content_type(&self) -> &ContentType {
        &self.content_type
    }

    fn is_indexing_enabled(&self, _scope: ScopeId) -> bool {
        self.enabled
    }

    fn is_indexable(&self, _scope: ScopeId, id: u64) -> bool {
        (self.admit)(id)
    }

    fn build_document(&self, scope: ScopeId, id: u64) -> Result<Option<Document>, BuildError> {
        self.build_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(Document::new(
            self.document_identity(scope, id),
            id,
            self.body(id),
        )))
    }

    fn document_identity(&self, scope: ScopeId, id: u64) -> DocumentIdentity {
        DocumentIdentity::derive(scope, self.content_type.as_str(), id, self.content_type.as_str())
    }
}

/// One call received by the [`RecordingClient`].
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCall {
    Write { doc_type: String, ids: Vec<u64> },
    Delete(DeleteRequest),
}

/// Write client with an in-memory index and a call log.
#[derive(Default)]
pub struct RecordingClient {
    index: Mutex<BTreeMap<String, Document>>,
    calls: Mutex<Vec<ClientCall>>,
    write_calls: AtomicUsize,
    fail_write: Mutex<Option<(usize, WriteError)>>,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `nth` bulk write call (1-based) with `error`.
    pub fn fail_write_on(&self, nth: usize, error: WriteError) {
        *self.fail_write.lock().unwrap() = Some((nth, error));
    }

    /// Seed the index with documents, bypassing the call log.
    pub fn seed(&self, documents: impl IntoIterator<Item = Document>) {
        let mut index = self.index.lock().unwrap();
        for d in documents {
            index.insert(d.identity.doc_id.clone(), d);
        }
    }

    pub fn snapshot(&self) -> BTreeMap<String, Document> {
        self.index.lock().unwrap().clone()
    }

    /// Source ids indexed for `doc_type`.
    pub fn indexed_ids(&self, doc_type: &str) -> BTreeSet<u64> {
        self.index
            .lock()
            .unwrap()
            .values()
            .filter(|d| d.identity.doc_type == doc_type)
            .map(|d| d.source_id)
            .collect()
    }

    pub fn calls(&self) -> Vec<ClientCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Ids of every successful bulk write, in call order.
    pub fn written_ids(&self) -> Vec<u64> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ClientCall::Write { ids, .. } => Some(ids),
                ClientCall::Delete(_) => None,
            })
            .flatten()
            .collect()
    }

    pub fn delete_filters(&self) -> Vec<DeleteFilter> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ClientCall::Delete(request) => Some(request.filter),
                ClientCall::Write { .. } => None,
            })
            .collect()
    }

    /// Delete calls with the given filter label ("pre", "ranged", ...).
    pub fn count_deletes(&self, label: &str) -> usize {
        self.delete_filters()
            .iter()
            .filter(|f| f.label() == label)
            .count()
    }

    fn matches(request: &DeleteRequest, document: &Document) -> bool {
        if document.identity.doc_type != request.content_type.as_str() {
            return false;
        }
        if !document
            .identity
            .doc_id
            .starts_with(&format!("{}-", request.scope))
        {
            return false;
        }
        match &request.filter {
            DeleteFilter::Field { field, value } => document.body.get(field) == Some(value),
            filter => filter.covers(document.source_id),
        }
    }
}

impl WriteClient for RecordingClient {
    fn bulk_write(&self, documents: &[Document]) -> Result<(), WriteError> {
        let call = self.write_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((nth, error)) = self.fail_write.lock().unwrap().as_ref() {
            if *nth == call {
                return Err(error.clone());
            }
        }

        let mut index = self.index.lock().unwrap();
        for d in documents {
            index.insert(d.identity.doc_id.clone(), d.clone());
        }
        self.calls.lock().unwrap().push(ClientCall::Write {
            doc_type: documents
                .first()
                .map(|d| d.identity.doc_type.clone())
                .unwrap_or_default(),
            ids: documents.iter().map(|d| d.source_id).collect(),
        });
        Ok(())
    }

    fn delete_by_filter(&self, request: &DeleteRequest) -> Result<(), WriteError> {
        self.index
            .lock()
            .unwrap()
            .retain(|_, d| !Self::matches(request, d));
        self.calls
            .lock()
            .unwrap()
            .push(ClientCall::Delete(request.clone()));
        Ok(())
    }

    fn get_document(&self, identity: &DocumentIdentity) -> Result<Option<Document>, WriteError> {
        Ok(self.index.lock().unwrap().get(&identity.doc_id).cloned())
    }

    fn delete_document(&self, identity: &DocumentIdentity) -> Result<(), WriteError> {
        self.index.lock().unwrap().remove(&identity.doc_id);
        Ok(())
    }

    fn update_document(
        &self,
        identity: &DocumentIdentity,
        payload: &UpdatePayload,
    ) -> Result<(), WriteError> {
        let mut index = self.index.lock().unwrap();
        let Some(document) = index.get_mut(&identity.doc_id) else {
            return Err(WriteError::MalformedRequest(format!(
                "document {} not found",
                identity.doc_id
            )));
        };
        if let Some(body) = document.body.as_object_mut() {
            for (k, v) in &payload.fields {
                body.insert(k.clone(), v.clone());
            }
        }
        Ok(())
    }
}

/// Memory gate that trips from its `trip_at`-th check on (0-based).
pub struct ScriptedMemoryGate {
    trip_at: Option<usize>,
    checks: AtomicUsize,
}

impl ScriptedMemoryGate {
    pub fn trip_at(check: usize) -> Self {
        Self {
            trip_at: Some(check),
            checks: AtomicUsize::new(0),
        }
    }

    pub fn never() -> Self {
        Self {
            trip_at: None,
            checks: AtomicUsize::new(0),
        }
    }

    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

impl MemoryGate for ScriptedMemoryGate {
    fn read(&self) -> Option<MemoryReading> {
        let check = self.checks.fetch_add(1, Ordering::SeqCst);
        let tripped = self.trip_at.is_some_and(|at| check >= at);
        Some(MemoryReading {
            used_bytes: if tripped { 2 } else { 1 },
            ceiling_bytes: 2,
        })
    }
}

/// Shared test harness for E2E tests.
///
/// Wires a [`MemorySource`] and a [`FakeBuilder`] for one content type into
/// a [`BulkIndexer`] backed by a [`RecordingClient`].
pub struct TestHarness {
    pub source: Arc<MemorySource>,
    pub builder: Arc<FakeBuilder>,
    pub client: Arc<RecordingClient>,
    pub config: IndexerConfig,
}

impl TestHarness {
    pub fn new(source: MemorySource, builder: FakeBuilder) -> Self {
        Self {
            source: Arc::new(source),
            builder: Arc::new(builder),
            client: Arc::new(RecordingClient::new()),
            config: IndexerConfig::default(),
        }
    }

    /// `n` sequential ids, all indexable, as content type "post".
    pub fn sequential(n: u64) -> Self {
        Self::new(MemorySource::sequential(n), FakeBuilder::all("post"))
    }

    pub fn with_config(mut self, config: IndexerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn content_type(&self) -> ContentType {
        self.builder.content_type().clone()
    }

    pub fn registry(&self) -> BuilderRegistry {
        BuilderRegistry::new().with(
            self.builder.clone(),
            Arc::new(ScanFactory::new(self.source.clone())),
        )
    }

    pub fn indexer(&self) -> BulkIndexer {
        BulkIndexer::new(
            Arc::new(self.registry()),
            self.client.clone(),
            self.config.clone(),
        )
    }

    pub fn request(&self, start_id: u64) -> RunRequest {
        RunRequest::new(SCOPE, vec![self.content_type()]).with_start_id(start_id)
    }

    /// Run from `start_id` without a memory ceiling.
    pub fn run(&self, start_id: u64) -> RunOutcome {
        self.indexer()
            .run(&self.request(start_id))
            .expect("run should not fail fatally")
    }

    pub fn run_with_gate(&self, start_id: u64, gate: Arc<dyn MemoryGate>) -> RunOutcome {
        self.indexer()
            .with_memory_gate(gate)
            .run(&self.request(start_id))
            .expect("run should not fail fatally")
    }

    /// Documents the builder would produce for `ids`.
    pub fn documents(&self, ids: impl IntoIterator<Item = u64>) -> Vec<Document> {
        ids.into_iter()
            .map(|id| {
                self.builder
                    .build_document(SCOPE, id)
                    .expect("fake builder never fails")
                    .expect("fake builder always builds")
            })
            .collect()
    }

    /// Expected index contents: one document per admitted source row.
    pub fn expected_ids(&self) -> BTreeSet<u64> {
        self.source
            .ids()
            .into_iter()
            .filter(|id| self.builder.is_indexable(SCOPE, *id))
            .collect()
    }
}
