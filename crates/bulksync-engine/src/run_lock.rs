//! Per-run exclusion.
//!
//! A run's cursor and delete checkpoint are exclusive state, so two runs over
//! the same `(scope, content type)` must never overlap. [`RunLocks`] hands out
//! at most one [`RunGuard`] per pair; different pairs never contend.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bulksync_types::{ContentType, ScopeId};

type RunKey = (ScopeId, ContentType);

/// Registry of in-progress runs.
#[derive(Debug, Default, Clone)]
pub struct RunLocks {
    active: Arc<Mutex<HashSet<RunKey>>>,
}

impl RunLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The set of held pairs. A panic while it was locked leaves the set
    /// itself consistent, so poisoning is ignored.
    fn active(&self) -> MutexGuard<'_, HashSet<RunKey>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim `(scope, content_type)`, `None` if a run already holds it.
    pub fn try_acquire(&self, scope: ScopeId, content_type: &ContentType) -> Option<RunGuard> {
        let key = (scope, content_type.clone());
        let mut active = self.active();
        if !active.insert(key.clone()) {
            return None;
        }
        Some(RunGuard {
            active: self.active.clone(),
            keys: vec![key],
        })
    }

    /// Claim every pair or none of them.
    pub fn try_acquire_all(&self, scope: ScopeId, content_types: &[ContentType]) -> Option<RunGuard> {
        let keys: Vec<RunKey> = content_types
            .iter()
            .map(|t| (scope, t.clone()))
            .collect();
        let mut active = self.active();
        if keys.iter().any(|k| active.contains(k)) {
            return None;
        }
        active.extend(keys.iter().cloned());
        Some(RunGuard {
            active: self.active.clone(),
            keys,
        })
    }

    pub fn is_running(&self, scope: ScopeId, content_type: &ContentType) -> bool {
        self.active().contains(&(scope, content_type.clone()))
    }
}

/// Releases its pairs when dropped, including on panic.
#[derive(Debug)]
pub struct RunGuard {
    active: Arc<Mutex<HashSet<RunKey>>>,
    keys: Vec<RunKey>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        for key in &self.keys {
            active.remove(key);
        }
    }
}
