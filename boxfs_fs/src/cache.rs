use boxfs_core::NodeKind;
use boxfs_core::path;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub kind: NodeKind,
    pub id: String,
}

/// Normalized path to `(kind, id)`.
///
/// Entries live until invalidated; there is no TTL. All access goes through
/// one lock so multi-key invalidation is atomic to concurrent resolvers. The
/// lock is never held across an await point.
#[derive(Debug, Default)]
pub struct PathCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl PathCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get_entry(&self, path: &str) -> Option<CacheEntry> {
        self.lock().get(&path::normalize(path)).cloned()
    }

    /// Returns the cached ID only if the entry has the wanted kind.
    pub fn get(&self, path: &str, kind: NodeKind) -> Option<String> {
        self.get_entry(path)
            .filter(|entry| entry.kind == kind)
            .map(|entry| entry.id)
    }

    /// The root is never cached.
    pub fn insert(&self, path: &str, kind: NodeKind, id: impl Into<String>) {
        let key = path::normalize(path);
        if key.is_empty() {
            return;
        }
        self.lock().insert(
            key,
            CacheEntry {
                kind,
                id: id.into(),
            },
        );
    }

    pub fn contains(&self, path: &str) -> bool {
        self.lock().contains_key(&path::normalize(path))
    }

    /// Drops the entry for `path`, every strict ancestor, and everything below
    /// `path`. Siblings are kept. Returns the number of entries removed.
    pub fn invalidate(&self, path: &str) -> usize {
        let key = path::normalize(path);
        let mut entries = self.lock();
        let before = entries.len();
        entries.remove(&key);
        for ancestor in path::ancestors(&key) {
            entries.remove(ancestor);
        }
        entries.retain(|cached, _| !path::is_descendant(cached, &key));
        before - entries.len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Cached paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.lock().keys().cloned().collect();
        paths.sort();
        paths
    }
}
