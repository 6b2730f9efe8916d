// SPDX-License-Identifier: MIT OR Apache-2.0
// Module declarations
pub mod cache;
pub mod complete_cache;
pub mod config;
pub mod error;
pub mod file_consumer;
pub mod frontend;
pub mod index_file;
pub mod indexer;
pub mod ipc;
pub mod jsonrpc;
pub mod lru_cache;
pub mod perf;
pub mod pipeline;
pub mod query;
pub mod query_utils;
pub mod text_utils;
pub mod types;
pub mod uri;
pub mod usr;

// Re-export the main types and structs
pub use config::IndexerConfig;
pub use error::{Result, SemindexError};
pub use file_consumer::{FileConsumer, FileConsumerSharedState};
pub use frontend::{ParseFrontEnd, ParseRequest, TranslationUnit};
pub use index_file::{IndexFile, IndexFunc, IndexType, IndexVar};
pub use ipc::{IpcMessage, IpcMessageQueue};
pub use lru_cache::LruCache;
pub use pipeline::{ImportPipeline, IndexRequest};
pub use query::{IdMap, IndexUpdate, QueryDatabase, UsrTables};
pub use types::{Position, Range};
pub use uri::{NormalizedPath, Uri};
pub use usr::{hash_usr, Usr};

// Logging utilities
pub mod logging {
    use tracing_subscriber::EnvFilter;

    /// Initialize tracing with SEMINDEX_DEBUG environment variable support.
    /// Provides consistent logging configuration across the binaries and
    /// embedding hosts.
    pub fn init_tracing() {
        let log_level = std::env::var("SEMINDEX_DEBUG").unwrap_or_else(|_| "error".to_string());

        // Map common values to appropriate filter strings
        let filter_str = match log_level.as_str() {
            "0" | "off" | "none" => "error",
            "1" | "warn" => "warn",
            "2" | "info" => "info",
            "3" | "debug" => "debug",
            "4" | "trace" => "trace",
            // Allow custom filter strings like "semindex=debug"
            custom => custom,
        };

        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_str));

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    }
}
