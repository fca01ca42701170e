//! Scope and content-type identifiers.
//!
//! Every collaborator call receives the scope explicitly; nothing in the
//! engine switches an ambient "current scope".

use serde::{Deserialize, Serialize};

/// The logical source partition being synchronized (a site, a tenant, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeId(u64);

impl ScopeId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for ScopeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ScopeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A sub-category of content indexed under its own document shape
/// (e.g. "post", "comment").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentType(String);

impl ContentType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse a comma separated list such as `"post,comment"`.
    ///
    /// Blank entries are dropped and surrounding whitespace is trimmed.
    pub fn parse_list(list: &str) -> Vec<ContentType> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ContentType::new)
            .collect()
    }
}

impl From<&str> for ContentType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
