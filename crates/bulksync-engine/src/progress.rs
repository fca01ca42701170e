//! Progress observers for bulk runs.

use bulksync_types::{ContentType, ScopeId};
use tracing::info;

use crate::stats::RunStats;

/// Receives progress after every written batch.
pub trait ProgressCallback: Send + Sync {
    fn on_progress(&self, scope: ScopeId, content_type: &ContentType, stats: &RunStats);
}

/// A no-op progress callback for when progress reporting isn't needed.
pub struct NoOpProgressCallback;

impl ProgressCallback for NoOpProgressCallback {
    fn on_progress(&self, _scope: ScopeId, _content_type: &ContentType, _stats: &RunStats) {}
}

/// Logs progress at info level every `every_fetches` fetches.
pub struct LoggingProgressCallback {
    every_fetches: usize,
}

impl LoggingProgressCallback {
    pub fn new(every_fetches: usize) -> Self {
        Self {
            every_fetches: every_fetches.max(1),
        }
    }
}

impl ProgressCallback for LoggingProgressCallback {
    fn on_progress(&self, scope: ScopeId, content_type: &ContentType, stats: &RunStats) {
        if stats.fetches % self.every_fetches == 0 {
            info!(
                scope = %scope,
                content_type = %content_type,
                fetches = stats.fetches,
                examined = stats.examined,
                written = stats.written,
                batch_size = stats.batch_size,
                "Bulk sync progress"
            );
        }
    }
}
