//! Folder handle cache
//!
//! Process-wide map from folder path prefix to remote folder handle. Each
//! prefix owns a once-cell, so concurrent callers resolving the same prefix
//! wait for a single initializer instead of racing to create the folder.
//! Entries never expire; [`FolderCache::clear`] drops everything.

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Cache of resolved folder handles keyed by cumulative path prefix.
#[derive(Debug)]
pub struct FolderCache<V> {
    entries: DashMap<String, Arc<OnceCell<V>>>,
}

impl<V> Default for FolderCache<V> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<V: Clone> FolderCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolved handle for `prefix`, if any.
    pub fn get(&self, prefix: &str) -> Option<V> {
        self.entries.get(prefix).and_then(|cell| cell.get().cloned())
    }

    pub fn contains(&self, prefix: &str) -> bool {
        self.get(prefix).is_some()
    }

    /// Return the handle for `prefix`, running `init` if it is not resolved.
    ///
    /// At most one `init` runs per prefix at a time. Callers arriving while
    /// it runs wait for its result. A failed `init` leaves the prefix
    /// unresolved and the next caller tries again.
    pub async fn get_or_try_init<F, Fut, E>(&self, prefix: &str, init: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let cell = self.cell(prefix);

        if let Some(value) = cell.get() {
            debug!(prefix, "Folder cache hit");
            return Ok(value.clone());
        }

        match cell.get_or_try_init(init).await {
            Ok(value) => Ok(value.clone()),
            Err(e) => {
                // Drop the empty cell unless another caller is waiting on it
                self.entries
                    .remove_if(prefix, |_, held| Arc::ptr_eq(held, &cell) && Arc::strong_count(held) == 2);
                Err(e)
            }
        }
    }

    /// Record a handle resolved elsewhere, replacing any previous one.
    pub fn insert(&self, prefix: impl Into<String>, value: V) {
        self.entries
            .insert(prefix.into(), Arc::new(OnceCell::new_with(Some(value))));
    }

    pub fn remove(&self, prefix: &str) -> Option<V> {
        self.entries
            .remove(prefix)
            .and_then(|(_, cell)| cell.get().cloned())
    }

    /// Drop every resolved entry. Initializations in flight keep their cell,
    /// so callers arriving during a clear still share a single `init`.
    pub fn clear(&self) {
        let count = self.len();
        self.entries
            .retain(|_, cell| !cell.initialized() && Arc::strong_count(cell) > 1);
        info!(count, "Folder cache cleared");
    }

    /// Number of resolved prefixes.
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolved prefixes and their handles, sorted by prefix.
    pub fn snapshot(&self) -> BTreeMap<String, V> {
        self.entries
            .iter()
            .filter_map(|entry| entry.value().get().map(|v| (entry.key().clone(), v.clone())))
            .collect()
    }

    fn cell(&self, prefix: &str) -> Arc<OnceCell<V>> {
        if let Some(cell) = self.entries.get(prefix) {
            return Arc::clone(cell.value());
        }

        // The shard guard is released at the end of the statement
        Arc::clone(
            self.entries
                .entry(prefix.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .value(),
        )
    }
}
