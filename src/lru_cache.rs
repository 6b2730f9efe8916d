// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cache that evicts entries which have not been used recently. Backed by
//! a plain vector with linear search, which beats anything fancier at the
//! sizes this is used for (a handful of entries).

use std::sync::Arc;

struct Entry<K, V> {
    /// A global counter stamps every access; the entry with the lowest
    /// stamp is the least recently used.
    score: u32,
    key: K,
    value: Arc<V>,
}

pub struct LruCache<K, V> {
    entries: Vec<Entry<K, V>>,
    max_entries: usize,
    next_score: u32,
}

impl<K: PartialEq, V> LruCache<K, V> {
    pub fn new(max_entries: usize) -> Self {
        assert!(max_entries > 0);
        Self {
            entries: Vec::new(),
            max_entries,
            next_score: 0,
        }
    }

    /// Fetch the entry for `key`, creating it with `allocator` on a miss.
    pub fn get(&mut self, key: &K, allocator: impl FnOnce() -> V) -> Arc<V>
    where
        K: Clone,
    {
        if let Some(value) = self.try_get(key) {
            return value;
        }
        let value = Arc::new(allocator());
        self.insert(key.clone(), value.clone());
        value
    }

    /// Fetch the entry for `key` and refresh its score so it is less
    /// likely to be evicted.
    pub fn try_get(&mut self, key: &K) -> Option<Arc<V>> {
        let position = self.entries.iter().position(|entry| entry.key == *key)?;
        self.increment_score();
        self.entries[position].score = self.next_score;
        Some(self.entries[position].value.clone())
    }

    /// Like `try_get`, but removes the entry.
    pub fn try_take(&mut self, key: &K) -> Option<Arc<V>> {
        let position = self.entries.iter().position(|entry| entry.key == *key)?;
        Some(self.entries.remove(position).value)
    }

    /// Insert an entry, evicting the lowest-scored one at capacity.
    pub fn insert(&mut self, key: K, value: Arc<V>) {
        if self.entries.len() >= self.max_entries {
            if let Some(lowest) = self
                .entries
                .iter()
                .enumerate()
                .min_by_key(|(_, entry)| entry.score)
                .map(|(position, _)| position)
            {
                self.entries.remove(lowest);
            }
        }

        self.increment_score();
        self.entries.push(Entry {
            score: self.next_score,
            key,
            value,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn increment_score(&mut self) {
        self.next_score = self.next_score.wrapping_add(1);

        // On overflow, renumber entries from zero preserving their
        // recency order (oldest keeps the lowest score).
        if self.next_score == 0 {
            self.entries.sort_by(|a, b| a.score.cmp(&b.score));
            for entry in &mut self.entries {
                entry.score = self.next_score;
                self.next_score += 1;
            }
        }
    }
}
