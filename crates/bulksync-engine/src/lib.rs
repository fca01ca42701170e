//! Resumable bulk synchronization of a relational source into a search index.
//!
//! This crate drives `(scope, content type)` runs that scan a source table
//! in id order, build index documents, and reconcile stale documents with
//! range-based deletes. Memory, cancellation and deadlines bound each run,
//! and any interruption returns a resume point.
//!
//! ## Key Components
//!
//! - [`SourceIterator`]: ordered id batches with adaptive sizing and a
//!   monotonic [`Cursor`]
//! - [`DocumentBuilder`]: per content-type document construction
//! - [`WriteClient`]: bulk and single-document index operations, with the
//!   [`WriteError`] failure taxonomy
//! - [`DeleteReconciler`]: pre, ranged and post delete filters
//! - [`BulkIndexer`]: the orchestrator
//! - [`ItemSync`]: typed single-item commands
//! - [`RunLocks`]: per-pair run exclusion
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use bulksync_engine::{BuilderRegistry, BulkIndexer, IndexerConfig, RunOutcome, RunRequest, ScanFactory};
//!
//! let registry = BuilderRegistry::new()
//!     .with(Arc::new(PostBuilder::new(db.clone())), Arc::new(ScanFactory::new(posts_table)));
//! let indexer = BulkIndexer::new(Arc::new(registry), client, IndexerConfig::from_settings(&settings));
//!
//! match indexer.run(&RunRequest::new(scope, vec!["post".into()]))? {
//!     RunOutcome::Completed { stats } => println!("wrote {}", stats.written),
//!     RunOutcome::Suspended { resume, .. } | RunOutcome::RetryLater { resume, .. } => {
//!         store.save(resume.to_bytes()?)?;
//!     }
//! }
//! ```

pub mod ancestry;
pub mod batch_size;
pub mod builder;
pub mod client;
pub mod cursor;
pub mod error;
pub mod indexer;
pub mod item;
pub mod iterator;
pub mod job;
pub mod memory;
pub mod progress;
pub mod reconciler;
pub mod registry;
pub mod run_lock;
pub mod source;
pub mod stats;
pub mod telemetry;

pub use ancestry::collect_ancestors;
pub use batch_size::{BatchSizer, MAX_BATCH_MULTIPLE, MIN_BATCH_SIZE};
pub use builder::DocumentBuilder;
pub use client::{WriteClient, WriteError};
pub use cursor::{Batch, Cursor};
pub use error::{BuildError, ErrorKind, SourceError, SyncError};
pub use indexer::{BulkIndexer, IndexerConfig, RunOutcome, RunRequest, SuspendReason};
pub use item::{ItemOutcome, ItemSync};
pub use iterator::{
    EmptyFactory, EmptyIterator, IteratorConfig, IteratorFactory, ScanFactory, ScanIterator,
    SingleDocumentFactory, SingleDocumentIterator, SourceIterator,
};
pub use job::{run_sync_job, JobResult, SyncJobConfig};
pub use memory::{MemoryGate, MemoryReading, NoMemoryLimit, ProcessMemoryGate};
pub use progress::{LoggingProgressCallback, NoOpProgressCallback, ProgressCallback};
pub use reconciler::{DeleteCounts, DeleteReconciler, DeleteStrategy};
pub use registry::{BuilderRegistry, Cascade, RegistryEntry};
pub use run_lock::{RunGuard, RunLocks};
pub use source::IdSource;
pub use stats::RunStats;
pub use telemetry::init_logging;
