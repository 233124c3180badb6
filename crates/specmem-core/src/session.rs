use crate::error::Result;
use crate::memory::MemoryStore;
use std::path::{Path, PathBuf};

/// Per-invocation context passed to operations that default to "the feature
/// being worked on".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    root: PathBuf,
    active_feature: Option<String>,
}

impl Session {
    pub fn new(root: &Path, active_feature: Option<String>) -> Self {
        Self {
            root: root.to_path_buf(),
            active_feature,
        }
    }

    /// Take the active feature from the current-context entry.
    pub fn load(root: &Path) -> Result<Self> {
        let store = MemoryStore::open(root)?;
        Ok(Self::from_store(&store))
    }

    pub fn from_store(store: &MemoryStore) -> Self {
        Self::new(
            store.root(),
            store.document().active_feature().map(str::to_string),
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn active_feature(&self) -> Option<&str> {
        self.active_feature.as_deref()
    }
}
