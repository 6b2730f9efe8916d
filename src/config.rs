// SPDX-License-Identifier: MIT OR Apache-2.0
//! Runtime configuration for the indexer and import pipeline.

use serde::Deserialize;
use std::path::PathBuf;

/// How many indexer threads to run by default: 80% of the hardware
/// threads, rounded, never less than one.
pub fn default_index_threads() -> usize {
    ((num_cpus::get() as f64 * 0.8).round() as usize).max(1)
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexerConfig {
    /// Number of parallel indexer (parse) workers.
    #[serde(default = "default_index_threads")]
    pub index_threads: usize,

    /// Directory holding per-file index artifacts. `None` disables the
    /// on-disk cache entirely.
    #[serde(default)]
    pub cache_directory: Option<PathBuf>,

    /// Master switch; when false, index requests are acknowledged and
    /// dropped.
    #[serde(default = "default_true")]
    pub enable_indexing: bool,

    /// Read previously written artifacts instead of reparsing when valid.
    #[serde(default = "default_true")]
    pub enable_cache_read: bool,

    /// Write artifacts after each merge.
    #[serde(default = "default_true")]
    pub enable_cache_write: bool,

    /// Size in bytes of the shared IPC region. Overridable so tests can
    /// exercise the backpressure path with a tiny region.
    #[serde(default = "IndexerConfig::default_ipc_region_size")]
    pub ipc_region_size: usize,
}

impl IndexerConfig {
    pub fn default_ipc_region_size() -> usize {
        1024 * 1024
    }
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            index_threads: default_index_threads(),
            cache_directory: None,
            enable_indexing: true,
            enable_cache_read: true,
            enable_cache_write: true,
            ipc_region_size: Self::default_ipc_region_size(),
        }
    }
}
