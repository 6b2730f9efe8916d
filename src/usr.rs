// SPDX-License-Identifier: MIT OR Apache-2.0
//! Unified Symbol Resolution identifiers.
//!
//! The front end hands us opaque textual USRs (`c:@S@Foo@F@foo#1`). They are
//! stable across translation units but far too heavy to key every table
//! with, so we hash them to 64 bits once at the edge and use the hash
//! everywhere. The hash must be stable across processes and runs because it
//! is persisted inside on-disk index artifacts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 64-bit hash of a textual USR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Usr(pub u64);

impl fmt::Display for Usr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Hash a textual USR. blake3 truncated to its first 8 bytes; deterministic
/// across platforms, unlike the std hasher.
pub fn hash_usr(usr: &str) -> Usr {
    let digest = blake3::hash(usr.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest.as_bytes()[..8]);
    Usr(u64::from_le_bytes(bytes))
}

/// Fingerprint a compiler argument list for cache validity checks.
pub fn hash_args(args: &[String]) -> u64 {
    let mut hasher = blake3::Hasher::new();
    for arg in args {
        hasher.update(arg.as_bytes());
        hasher.update(&[0]);
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hasher.finalize().as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}
