// SPDX-License-Identifier: MIT OR Apache-2.0
//! Paths and URIs as distinct types.
//!
//! A [`NormalizedPath`] is the canonical on-disk identity of a file: forward
//! slashes, symlinks resolved where possible. A [`Uri`] is the `file://`
//! form the editor speaks. Keeping them apart makes every conversion
//! explicit, so a URI never leaks into a map keyed by path or vice versa.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Characters that must be percent-encoded inside a `file://` URI.
fn must_escape(c: char) -> bool {
    matches!(
        c,
        ' ' | '#' | '$' | '&' | '(' | ')' | '+' | ',' | ';' | '?' | '@'
    )
}

fn is_windows_drive_prefix(path: &str) -> bool {
    let mut chars = path.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some(drive), Some(':')) if drive.is_ascii_alphabetic()
    )
}

/// A normalized filesystem path: `/` separators, symlinks resolved at
/// construction when the file exists.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedPath(String);

impl NormalizedPath {
    pub fn new(path: impl AsRef<str>) -> Self {
        let slashed = path.as_ref().replace('\\', "/");
        // Resolve symlinks so two spellings of one file share one index
        // slot. Nonexistent paths (unsaved buffers, deleted files) keep
        // their literal form.
        match std::fs::canonicalize(&slashed) {
            Ok(resolved) => NormalizedPath(resolved.to_string_lossy().replace('\\', "/")),
            Err(_) => NormalizedPath(slashed),
        }
    }

    /// Wrap a string that is already normalized (e.g. read back from an
    /// index artifact).
    pub fn from_normalized(path: impl Into<String>) -> Self {
        NormalizedPath(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A `file://` URI as exchanged with the editor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uri(String);

impl Uri {
    pub fn from_path(path: &NormalizedPath) -> Uri {
        let raw = path.as_str();
        let windows = is_windows_drive_prefix(raw);

        let mut encoded = String::with_capacity(raw.len() + 16);
        encoded.push_str(if windows { "file:///" } else { "file://" });

        for (i, c) in raw.char_indices() {
            // The colon after a single-letter drive is escaped too.
            if must_escape(c) || (windows && i == 1 && c == ':') {
                let mut buffer = [0u8; 4];
                for byte in c.encode_utf8(&mut buffer).bytes() {
                    encoded.push('%');
                    encoded.push_str(&format!("{:02X}", byte));
                }
            } else {
                encoded.push(c);
            }
        }
        Uri(encoded)
    }

    /// Wrap a URI string received from the editor.
    pub fn from_raw(raw: impl Into<String>) -> Uri {
        Uri(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reverse the encoding back to a path: strip the scheme, decode
    /// percent escapes, normalize separators.
    pub fn to_path(&self) -> NormalizedPath {
        let mut rest = self
            .0
            .strip_prefix("file://")
            .unwrap_or(&self.0)
            .to_string();

        // Decode %XX escapes.
        let mut decoded = Vec::with_capacity(rest.len());
        let bytes = rest.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'%' {
                if let (Some(hi), Some(lo)) = (
                    bytes.get(i + 1).and_then(|b| (*b as char).to_digit(16)),
                    bytes.get(i + 2).and_then(|b| (*b as char).to_digit(16)),
                ) {
                    decoded.push((hi * 16 + lo) as u8);
                    i += 3;
                    continue;
                }
            }
            decoded.push(bytes[i]);
            i += 1;
        }
        rest = String::from_utf8_lossy(&decoded).replace('\\', "/");

        // `file:///C:/...` keeps a leading slash in front of the drive.
        if rest.len() >= 3 && rest.starts_with('/') && is_windows_drive_prefix(&rest[1..]) {
            rest.remove(0);
        }

        NormalizedPath::from_normalized(rest)
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
