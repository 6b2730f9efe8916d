// SPDX-License-Identifier: MIT OR Apache-2.0
//! On-disk cache of per-file index artifacts.
//!
//! Each artifact is an opaque versioned JSON blob keyed by the normalized
//! source path (escaped so it is usable as a file name). An artifact is
//! only trusted when its index version matches, the compiler-argument
//! fingerprint is unchanged, and the source has not been modified after the
//! artifact was written. Anything else is a cache miss and the file is
//! reparsed.

use crate::error::SemindexError;
use crate::index_file::{IndexFile, INDEX_FILE_VERSION};
use crate::usr::hash_args;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

#[derive(Debug, Serialize, Deserialize)]
struct CacheArtifact {
    version: i32,
    args_hash: u64,
    index: IndexFile,
}

/// Converts a source path to a flat cache file name,
/// e.g. `/foo/bar.cc` → `@foo@bar.cc.json`.
fn escape_file_name(path: &str) -> String {
    let mut escaped: String = path
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '@',
            other => other,
        })
        .collect();
    escaped.push_str(".json");
    escaped
}

pub fn artifact_path(cache_directory: &Path, source_path: &str) -> PathBuf {
    cache_directory.join(escape_file_name(source_path))
}

/// Seconds since the epoch of a file's mtime, or `None` when unreadable.
pub fn modification_time(path: &Path) -> Option<i64> {
    let metadata = std::fs::metadata(path).ok()?;
    let mtime = metadata.modified().ok()?;
    Some(mtime.duration_since(UNIX_EPOCH).ok()?.as_secs() as i64)
}

/// Write one artifact, overwriting any previous version.
pub fn write_artifact(cache_directory: &Path, index: &IndexFile) -> Result<()> {
    std::fs::create_dir_all(cache_directory)
        .with_context(|| format!("creating cache directory {}", cache_directory.display()))?;

    let artifact = CacheArtifact {
        version: INDEX_FILE_VERSION,
        args_hash: hash_args(&index.args),
        index: index.clone(),
    };
    let serialized = serde_json::to_vec(&artifact)?;
    let destination = artifact_path(cache_directory, &index.path);
    std::fs::write(&destination, serialized)
        .with_context(|| format!("writing index artifact {}", destination.display()))?;
    Ok(())
}

/// Load an artifact without any freshness checks. Version mismatch is a
/// typed error so callers can treat it as a miss.
pub fn read_artifact(
    cache_directory: &Path,
    source_path: &str,
) -> std::result::Result<IndexFile, SemindexError> {
    let location = artifact_path(cache_directory, source_path);
    let bytes = std::fs::read(&location)?;
    let artifact: CacheArtifact = serde_json::from_slice(&bytes)?;
    if artifact.version != INDEX_FILE_VERSION {
        return Err(SemindexError::CacheVersionMismatch {
            found: artifact.version,
            expected: INDEX_FILE_VERSION,
        });
    }
    Ok(artifact.index)
}

/// The fast path of the import pipeline: return a cached index instead of
/// reparsing when it is still valid for `args`.
pub fn try_load_valid(
    cache_directory: &Path,
    source_path: &str,
    args: &[String],
) -> Option<IndexFile> {
    let location = artifact_path(cache_directory, source_path);
    let artifact_mtime = modification_time(&location)?;
    let source_mtime = modification_time(Path::new(source_path))?;
    if source_mtime > artifact_mtime {
        tracing::debug!("cache artifact for {} is stale (mtime)", source_path);
        return None;
    }

    match read_artifact(cache_directory, source_path) {
        Ok(index) => {
            if hash_args(&index.args) != hash_args(args) {
                tracing::debug!("cache artifact for {} has different args", source_path);
                return None;
            }
            Some(index)
        }
        Err(SemindexError::CacheVersionMismatch { found, expected }) => {
            tracing::info!(
                "discarding cache artifact for {} (version {} != {})",
                source_path,
                found,
                expected
            );
            None
        }
        Err(e) => {
            tracing::warn!("failed to read cache artifact for {}: {}", source_path, e);
            None
        }
    }
}

/// Load the previous index for a merge, ignoring freshness (the merge
/// wants whatever state was last applied, not whatever is current).
pub fn try_load_previous(cache_directory: &Path, source_path: &str) -> Option<IndexFile> {
    match read_artifact(cache_directory, source_path) {
        Ok(index) => Some(index),
        Err(SemindexError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            tracing::warn!("previous index for {} unreadable: {}", source_path, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usr::hash_usr;
    use tempfile::TempDir;

    fn sample_index(path: &str) -> IndexFile {
        let mut index = IndexFile::new(path);
        index.import_file = path.to_string();
        index.args = vec!["-xc++".to_string()];
        let id = index.type_id(hash_usr("c:@S@Foo"));
        index.ty_mut(id).def.short_name = "Foo".to_string();
        index
    }

    #[test]
    fn artifact_round_trips() {
        let dir = TempDir::new().unwrap();
        let index = sample_index("/src/foo.cc");
        write_artifact(dir.path(), &index).unwrap();
        let loaded = read_artifact(dir.path(), "/src/foo.cc").unwrap();
        assert_eq!(loaded, index);
    }

    #[test]
    fn version_mismatch_is_a_typed_miss() {
        let dir = TempDir::new().unwrap();
        let index = sample_index("/src/foo.cc");
        write_artifact(dir.path(), &index).unwrap();

        // Rewrite the envelope with a bumped version.
        let location = artifact_path(dir.path(), "/src/foo.cc");
        let mut value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&location).unwrap()).unwrap();
        value["version"] = serde_json::json!(INDEX_FILE_VERSION + 1);
        std::fs::write(&location, serde_json::to_vec(&value).unwrap()).unwrap();

        match read_artifact(dir.path(), "/src/foo.cc") {
            Err(SemindexError::CacheVersionMismatch { found, expected }) => {
                assert_eq!(found, INDEX_FILE_VERSION + 1);
                assert_eq!(expected, INDEX_FILE_VERSION);
            }
            other => panic!("expected version mismatch, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn truncated_artifact_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let index = sample_index("/src/foo.cc");
        write_artifact(dir.path(), &index).unwrap();

        let location = artifact_path(dir.path(), "/src/foo.cc");
        let bytes = std::fs::read(&location).unwrap();
        std::fs::write(&location, &bytes[..bytes.len() / 2]).unwrap();

        assert!(try_load_previous(dir.path(), "/src/foo.cc").is_none());
    }

    #[test]
    fn valid_load_requires_matching_args() {
        let dir = TempDir::new().unwrap();

        // Write the source file first so its mtime is not newer than the
        // artifact's.
        let source = dir.path().join("foo.cc");
        std::fs::write(&source, "struct Foo {};\n").unwrap();
        let source_path = source.to_str().unwrap().to_string();

        let mut index = sample_index(&source_path);
        index.args = vec!["-DX=1".to_string()];
        write_artifact(dir.path(), &index).unwrap();

        assert!(try_load_valid(dir.path(), &source_path, &["-DX=1".to_string()]).is_some());
        assert!(try_load_valid(dir.path(), &source_path, &["-DX=2".to_string()]).is_none());
    }

    #[test]
    fn paths_escape_to_distinct_flat_names() {
        assert_ne!(escape_file_name("/a/b.cc"), escape_file_name("/a_b.cc"));
        assert!(!escape_file_name("C:\\src\\x.cc").contains('\\'));
    }
}
