// SPDX-License-Identifier: MIT OR Apache-2.0
//! Header ownership arbitration.
//!
//! While several translation units index in parallel they all see the same
//! headers. Exactly one translation unit may produce the authoritative
//! index for each header per indexing round; the rest drop their events for
//! it. Arbitration is a single atomic insert into a process-wide map, so
//! whichever worker reaches a header first wins.

use crate::index_file::IndexFile;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// Process-wide ownership table: normalized file path → path of the owning
/// translation unit. Lives for one indexing round.
#[derive(Debug, Default)]
pub struct FileConsumerSharedState {
    owners: DashMap<String, String>,
}

impl FileConsumerSharedState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Atomically claim `path` for `tu_path`. Returns true when the claim
    /// won (no previous owner).
    fn try_mark(&self, path: &str, tu_path: &str) -> bool {
        match self.owners.entry(path.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(tu_path.to_string());
                true
            }
        }
    }

    /// Release one file so the next round can claim it, typically because
    /// it changed on disk.
    pub fn reset(&self, path: &str) {
        self.owners.remove(path);
    }

    /// Start a fresh indexing round.
    pub fn clear(&self) {
        self.owners.clear();
    }

    pub fn owner_of(&self, path: &str) -> Option<String> {
        self.owners.get(path).map(|owner| owner.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// First sight of this file in this TU and the global claim won: a
    /// fresh `IndexFile` was allocated.
    NewlyOwned,
    /// Seen before in this TU and we own it.
    AlreadyOwned,
    /// Another translation unit owns this file; drop events for it.
    NotOwned,
}

/// Per-translation-unit view of the ownership table. Holds the indexes
/// this TU is building; they are surrendered wholesale at the end of the
/// parse.
pub struct FileConsumer {
    shared: Arc<FileConsumerSharedState>,
    tu_path: String,
    /// `None` marks a file some other TU owns, so we only consult the
    /// shared table once per file.
    local: gxhash::HashMap<String, Option<Box<IndexFile>>>,
}

impl FileConsumer {
    pub fn new(shared: Arc<FileConsumerSharedState>, tu_path: impl Into<String>) -> Self {
        Self {
            shared,
            tu_path: tu_path.into(),
            local: gxhash::HashMap::default(),
        }
    }

    pub fn claim(&mut self, path: &str) -> Claim {
        if let Some(slot) = self.local.get(path) {
            return if slot.is_some() {
                Claim::AlreadyOwned
            } else {
                Claim::NotOwned
            };
        }

        if self.shared.try_mark(path, &self.tu_path) {
            self.local
                .insert(path.to_string(), Some(Box::new(IndexFile::new(path))));
            Claim::NewlyOwned
        } else {
            self.local.insert(path.to_string(), None);
            Claim::NotOwned
        }
    }

    /// The index under construction for `path`, if this TU owns it.
    pub fn file_mut(&mut self, path: &str) -> Option<&mut IndexFile> {
        self.local
            .get_mut(path)
            .and_then(|slot| slot.as_deref_mut())
    }

    /// Surrender every owned index, ending this TU's participation in the
    /// round. Shared ownership marks stay until the round is reset so no
    /// other TU re-indexes the same headers concurrently.
    pub fn take_local_state(self) -> Vec<IndexFile> {
        self.local
            .into_values()
            .flatten()
            .map(|boxed| *boxed)
            .collect()
    }
}
