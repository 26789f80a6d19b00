use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Persisted collection metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub name: String,
    /// Field paths carrying a unique constraint, besides the implicit `_id`.
    #[serde(default)]
    pub unique: Vec<String>,
}

impl CollectionConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unique: Vec::new(),
        }
    }
}

struct CollectionHandleInner {
    name: String,
    unique: Vec<String>,
}

/// A resolved collection handle.
///
/// Obtained from [`crate::KvTransaction::collection`]. Cheap to clone (Arc bump).
/// Reflects the catalog at the moment it was resolved.
#[derive(Clone)]
pub struct CollectionHandle {
    inner: Arc<CollectionHandleInner>,
}

impl fmt::Debug for CollectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionHandle")
            .field("name", &self.inner.name)
            .field("unique", &self.inner.unique)
            .finish()
    }
}

impl CollectionHandle {
    pub(crate) fn from_config(config: &CollectionConfig) -> Self {
        Self {
            inner: Arc::new(CollectionHandleInner {
                name: config.name.clone(),
                unique: config.unique.clone(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The column family holding this collection's records and unique entries.
    pub(crate) fn cf(&self) -> &str {
        &self.inner.name
    }

    pub fn unique(&self) -> &[String] {
        &self.inner.unique
    }
}
