// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error taxonomy for the indexer core.
//!
//! Workers recover and drop: a parse or cache failure never poisons the
//! query database. Only the stdin reader and the apply worker treat errors
//! as fatal, and they do so at their own call sites, not here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SemindexError {
    /// Malformed JSON-RPC framing or message envelope. Fatal on stdin,
    /// recoverable on any other byte source.
    #[error("framing error: {0}")]
    Framing(String),

    /// A structurally valid message with an unknown method or kind. The
    /// message is dropped.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The front end could not produce a translation unit.
    #[error("failed to parse {path}")]
    Parse { path: String },

    /// An on-disk index artifact was written by a different index version.
    /// Treated as a cache miss.
    #[error("cache artifact version {found}, expected {expected}")]
    CacheVersionMismatch { found: i32, expected: i32 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SemindexError>;

impl SemindexError {
    /// True for conditions that must terminate the process to avoid
    /// serving corrupt state.
    pub fn is_fatal_on_stdin(&self) -> bool {
        matches!(self, SemindexError::Framing(_))
    }
}
