//! # bulksync-types
//!
//! Shared data types for the bulk index synchronization engine.
//!
//! This crate defines the plain data that flows between the source side,
//! the document builders and the index write client:
//! - Scopes and content types: which partition of the source is being synced
//! - Documents: built index payloads and their deterministic identities
//! - Delete filters: range-based reconciliation requests
//! - Item commands: typed single-document operations
//! - Resume state: what a caller persists to continue an interrupted run
//! - Settings: layered configuration
//!
//! ## Usage
//!
//! ```rust
//! use bulksync_types::{ContentType, DeleteFilter, ScopeId};
//!
//! let scope = ScopeId::new(42);
//! let filter = DeleteFilter::Ranged { from: 0, to: 149 };
//! assert!(filter.covers(100));
//! assert_eq!(ContentType::new("post").as_str(), "post");
//! # let _ = scope;
//! ```

pub mod command;
pub mod config;
pub mod document;
pub mod error;
pub mod filter;
pub mod resume;
pub mod scope;

pub use command::{FieldPatch, ItemCommand, PatchOp};
pub use config::{MemorySettings, Settings};
pub use document::{Document, DocumentIdentity, UpdatePayload};
pub use error::TypesError;
pub use filter::{DeleteFilter, DeleteRequest};
pub use resume::ResumeState;
pub use scope::{ContentType, ScopeId};
