// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cached completion results, so erasing a character can be answered from
//! the previous request instead of re-running completion. Editors resend
//! the completion request on deletion.

use crate::lru_cache::LruCache;
use crate::types::Position;
use std::sync::{Arc, Mutex};

/// One remembered completion result set.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedCompletion {
    pub position: Position,
    /// Opaque to this cache; the request layer stores its serialized
    /// completion items.
    pub results: Vec<String>,
}

/// Keyed by file path; only a handful of files are ever hot at once, so a
/// tiny LRU is plenty.
pub struct CodeCompleteCache {
    cache: Mutex<LruCache<String, CachedCompletion>>,
}

impl Default for CodeCompleteCache {
    fn default() -> Self {
        Self::new(5)
    }
}

impl CodeCompleteCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(max_entries)),
        }
    }

    /// The cached results for `path`, provided they were computed at the
    /// same position.
    pub fn try_get(&self, path: &str, position: Position) -> Option<Arc<CachedCompletion>> {
        let mut cache = self.cache.lock().unwrap();
        let cached = cache.try_get(&path.to_string())?;
        (cached.position == position).then_some(cached)
    }

    pub fn insert(&self, path: &str, position: Position, results: Vec<String>) {
        let mut cache = self.cache.lock().unwrap();
        cache.insert(
            path.to_string(),
            Arc::new(CachedCompletion { position, results }),
        );
    }

    /// Drop the entry for a file, e.g. after it is closed or edited.
    pub fn invalidate(&self, path: &str) {
        let mut cache = self.cache.lock().unwrap();
        cache.try_take(&path.to_string());
    }
}
