// src/system/filesystem.rs

//! Filesystem abstraction used by evaluation and tasks.
//!
//! [`RealFileSystem`] talks to the disk; [`MemoryFileSystem`] keeps files in a
//! map so build scenarios can run in tests without touching it.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use walkdir::WalkDir;

/// The operations the build engine needs from a filesystem.
pub trait FileSystem: Send + Sync + Debug {
    /// True if a file or directory exists at `path`.
    fn exists(&self, path: &Path) -> bool;
    fn is_file(&self, path: &Path) -> bool;
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
    /// Writes `contents`, creating missing parent directories.
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
    /// Copies a file, creating missing parent directories of `to`.
    fn copy(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn delete(&self, path: &Path) -> io::Result<()>;
    fn modified(&self, path: &Path) -> io::Result<SystemTime>;
    /// Every file below `root`, recursively, in a stable order.
    fn enumerate_files(&self, root: &Path) -> io::Result<Vec<PathBuf>>;
    fn current_dir(&self) -> io::Result<PathBuf>;

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).map_err(|e| io::Error::new(ErrorKind::InvalidData, e))
    }
}

// --- Real filesystem ---

#[derive(Debug, Default, Clone, Copy)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        if let Some(parent) = to.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(from, to).map(|_| ())
    }

    fn delete(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        std::fs::metadata(path)?.modified()
    }

    fn enumerate_files(&self, root: &Path) -> io::Result<Vec<PathBuf>> {
        if !root.is_dir() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(io::Error::other)?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }

    fn current_dir(&self) -> io::Result<PathBuf> {
        std::env::current_dir()
    }
}

// --- In-memory filesystem ---

#[derive(Debug, Clone)]
struct MemoryFile {
    contents: Vec<u8>,
    modified: SystemTime,
}

#[derive(Debug, Default)]
struct MemoryState {
    files: BTreeMap<PathBuf, MemoryFile>,
    clock: u64,
}

impl MemoryState {
    /// Every write gets a strictly later timestamp than the previous one.
    fn tick(&mut self) -> SystemTime {
        self.clock += 1;
        UNIX_EPOCH + Duration::from_secs(self.clock)
    }
}

/// A map-backed filesystem. Directories exist implicitly while they contain a file.
#[derive(Debug)]
pub struct MemoryFileSystem {
    state: Mutex<MemoryState>,
    current_dir: PathBuf,
}

impl MemoryFileSystem {
    pub fn new(current_dir: impl Into<PathBuf>) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            current_dir: current_dir.into(),
        }
    }

    /// Adds a file, returning `self` for fixture chaining.
    pub fn with_file(self, path: impl AsRef<Path>, contents: &str) -> Self {
        // A fresh map cannot fail to accept a write.
        let _ = self.write(path.as_ref(), contents.as_bytes());
        self
    }

    /// Overrides the modification time of an existing file.
    pub fn set_modified(&self, path: &Path, modified: SystemTime) -> io::Result<()> {
        let mut state = self.lock();
        let file = state
            .files
            .get_mut(path)
            .ok_or_else(|| not_found(path))?;
        file.modified = modified;
        Ok(())
    }

    /// All file paths currently stored.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.lock().files.keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        ErrorKind::NotFound,
        format!("'{}' does not exist", path.display()),
    )
}

impl FileSystem for MemoryFileSystem {
    fn exists(&self, path: &Path) -> bool {
        let state = self.lock();
        state.files.contains_key(path) || state.files.keys().any(|p| p.starts_with(path))
    }

    fn is_file(&self, path: &Path) -> bool {
        self.lock().files.contains_key(path)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.lock()
            .files
            .get(path)
            .map(|f| f.contents.clone())
            .ok_or_else(|| not_found(path))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut state = self.lock();
        let modified = state.tick();
        state.files.insert(
            path.to_path_buf(),
            MemoryFile {
                contents: contents.to_vec(),
                modified,
            },
        );
        Ok(())
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        let contents = self.read(from)?;
        self.write(to, &contents)
    }

    fn delete(&self, path: &Path) -> io::Result<()> {
        self.lock()
            .files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| not_found(path))
    }

    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        self.lock()
            .files
            .get(path)
            .map(|f| f.modified)
            .ok_or_else(|| not_found(path))
    }

    fn enumerate_files(&self, root: &Path) -> io::Result<Vec<PathBuf>> {
        Ok(self
            .lock()
            .files
            .keys()
            .filter(|p| p.starts_with(root) && p.as_path() != root)
            .cloned()
            .collect())
    }

    fn current_dir(&self) -> io::Result<PathBuf> {
        Ok(self.current_dir.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_filesystem_basic_operations() {
        let fs = MemoryFileSystem::new("/work").with_file("/work/src/a.txt", "alpha");
        assert!(fs.exists(Path::new("/work/src/a.txt")));
        assert!(fs.exists(Path::new("/work/src")));
        assert!(!fs.is_file(Path::new("/work/src")));

        fs.copy(Path::new("/work/src/a.txt"), Path::new("/work/out/a.txt"))
            .unwrap();
        assert_eq!(
            fs.read_to_string(Path::new("/work/out/a.txt")).unwrap(),
            "alpha"
        );
        assert!(
            fs.modified(Path::new("/work/out/a.txt")).unwrap()
                > fs.modified(Path::new("/work/src/a.txt")).unwrap()
        );

        fs.delete(Path::new("/work/src/a.txt")).unwrap();
        assert!(!fs.exists(Path::new("/work/src")));
        assert!(fs.delete(Path::new("/work/src/a.txt")).is_err());
    }

    #[test]
    fn test_memory_filesystem_enumerates_below_root() {
        let fs = MemoryFileSystem::new("/")
            .with_file("/p/a.cs", "")
            .with_file("/p/sub/b.cs", "")
            .with_file("/q/c.cs", "");
        let files = fs.enumerate_files(Path::new("/p")).unwrap();
        assert_eq!(
            files,
            vec![PathBuf::from("/p/a.cs"), PathBuf::from("/p/sub/b.cs")]
        );
    }

    #[test]
    fn test_real_filesystem_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let fs = RealFileSystem;
        let file = dir.path().join("nested").join("f.txt");
        fs.write(&file, b"data").unwrap();
        assert!(fs.is_file(&file));
        assert_eq!(fs.enumerate_files(dir.path()).unwrap(), vec![file.clone()]);
        fs.delete(&file).unwrap();
        assert!(!fs.exists(&file));
    }
}
