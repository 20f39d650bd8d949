// src/core/cache.rs

//! Binary cache of compiled projects.
//!
//! Entries are keyed by a hash of the project path, its content and the keel
//! version, so any edit (or upgrade) simply misses. Each entry is the
//! bincode-encoded [`Project`] compressed with LZ4.

use crate::models::Project;
use anyhow::{Context, Result, anyhow};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

const HASH_TRUNCATE_LENGTH: usize = 16; // 16 bytes = 32 hex characters
const ENTRY_EXTENSION: &str = "bin";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectCache {
    dir: PathBuf,
}

impl ProjectCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The cache key of a project file with the given content.
    pub fn key_for(&self, project_path: &Path, content: &[u8]) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(env!("CARGO_PKG_VERSION").as_bytes());
        hasher.update(&[0]);
        hasher.update(project_path.to_string_lossy().as_bytes());
        hasher.update(&[0]);
        hasher.update(content);
        let hash = hasher.finalize();
        hex::encode(hash.as_bytes().get(..HASH_TRUNCATE_LENGTH).unwrap_or_default())
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{ENTRY_EXTENSION}"))
    }

    /// Returns the cached project, `None` on a miss, or an error for an
    /// entry that exists but cannot be decoded.
    pub fn read(&self, key: &str) -> Result<Option<Project>> {
        let path = self.entry_path(key);
        if !path.is_file() {
            return Ok(None);
        }
        let compressed_bytes = fs::read(&path)
            .with_context(|| format!("Failed to read cache file at '{}'", path.display()))?;
        if compressed_bytes.is_empty() {
            return Err(anyhow!("Cache file '{}' is empty.", path.display()));
        }

        let decompressed_bytes = lz4_flex::decompress_size_prepended(&compressed_bytes)
            .map_err(|e| anyhow!("Failed to decompress cache file: {}. It might be corrupt.", e))?;
        debug!(
            "Decompressed cache entry {} from {} to {} bytes.",
            key,
            compressed_bytes.len(),
            decompressed_bytes.len()
        );

        let (project, _): (Project, usize) =
            bincode::serde::decode_from_slice(&decompressed_bytes, bincode::config::standard())
                .context("Failed to deserialize cache data after decompression.")?;
        Ok(Some(project))
    }

    pub fn write(&self, key: &str, project: &Project) -> Result<()> {
        fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create cache directory '{}'", self.dir.display())
        })?;
        let bytes = bincode::serde::encode_to_vec(project, bincode::config::standard())
            .context("Failed to serialize project for the cache.")?;
        let compressed_bytes = lz4_flex::compress_prepend_size(&bytes);

        let path = self.entry_path(key);
        fs::write(&path, &compressed_bytes)
            .with_context(|| format!("Failed to write cache file '{}'", path.display()))?;
        debug!(
            "Cached '{}' as {} ({} bytes).",
            project.filename.display(),
            key,
            compressed_bytes.len()
        );
        Ok(())
    }

    /// Deletes every cache entry. Returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        if !self.dir.exists() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to list cache directory '{}'", self.dir.display()))?
        {
            let path = entry?.path();
            let is_entry = path
                .extension()
                .is_some_and(|ext| ext == ENTRY_EXTENSION);
            if is_entry && path.is_file() {
                fs::remove_file(&path)
                    .with_context(|| format!("Failed to delete '{}'", path.display()))?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::core::ast::Expression;
    use crate::models::{Importance, Target, TaskKind, TaskNode};

    fn sample_project() -> Project {
        Project {
            filename: PathBuf::from("/p/app.keel.toml"),
            default_targets: Some(Expression::string("Build")),
            property_groups: vec![],
            item_groups: vec![],
            targets: vec![Target {
                name: "Build".to_string(),
                condition: None,
                depends_on_targets: None,
                inputs: None,
                outputs: None,
                tasks: vec![TaskNode {
                    condition: None,
                    kind: TaskKind::Message {
                        text: Expression::string("hi"),
                        importance: Importance::Low,
                    },
                }],
            }],
        }
    }

    #[test]
    fn test_key_depends_on_path_and_content() {
        let cache = ProjectCache::new("/tmp/unused");
        let a = cache.key_for(Path::new("/p/a.keel.toml"), b"x");
        assert_eq!(a.len(), 32);
        assert_eq!(a, cache.key_for(Path::new("/p/a.keel.toml"), b"x"));
        assert_ne!(a, cache.key_for(Path::new("/p/b.keel.toml"), b"x"));
        assert_ne!(a, cache.key_for(Path::new("/p/a.keel.toml"), b"y"));
    }

    #[test]
    fn test_write_read_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ProjectCache::new(dir.path().join("projects"));
        assert_eq!(cache.read("missing").unwrap(), None);

        let project = sample_project();
        cache.write("k1", &project).unwrap();
        assert_eq!(cache.read("k1").unwrap(), Some(project));
        assert_eq!(cache.clear().unwrap(), 1);
        assert_eq!(cache.read("k1").unwrap(), None);
    }

    #[test]
    fn test_corrupt_and_empty_entries_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ProjectCache::new(dir.path());
        fs::write(dir.path().join("empty.bin"), b"").unwrap();
        fs::write(dir.path().join("junk.bin"), b"\x05\x00\x00\x00garbage").unwrap();
        assert!(cache.read("empty").is_err());
        assert!(cache.read("junk").is_err());
    }
}
