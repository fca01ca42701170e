//! Row-level access to the relational source.

use bulksync_types::ScopeId;

use crate::error::SourceError;

/// Ordered id access to one table of the source.
///
/// Implementations typically wrap a query like
/// `SELECT id FROM <table> WHERE <in-scope predicate> AND id >= ? ORDER BY id LIMIT ?`.
pub trait IdSource: Send + Sync {
    /// Count in-scope rows with id `>= from_id`. May be an estimate.
    fn count(&self, scope: ScopeId, from_id: u64) -> Result<u64, SourceError>;

    /// Up to `limit` in-scope ids `>= from_id`, ascending.
    ///
    /// An empty result means the source is exhausted.
    fn fetch_ids(&self, scope: ScopeId, from_id: u64, limit: usize)
        -> Result<Vec<u64>, SourceError>;
}
