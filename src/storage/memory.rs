//! In-memory storage backend.
//!
//! Documents live in a map keyed by relative path. Writes can be made to fail
//! on demand, which lets callers exercise their write-failure handling.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::storage::{StorageBackend, StorageError};

/// Storage backend that keeps every document in memory.
#[derive(Default)]
pub struct MemoryStorageBackend {
    root: PathBuf,
    files: Mutex<BTreeMap<PathBuf, String>>,
    dirs: Mutex<BTreeSet<PathBuf>>,
    fail_writes: AtomicBool,
}

impl MemoryStorageBackend {
    /// Create an empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write and directory creation fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Paths of all stored documents, in sorted order.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files().keys().cloned().collect()
    }

    fn files(&self) -> MutexGuard<'_, BTreeMap<PathBuf, String>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dirs(&self) -> MutexGuard<'_, BTreeSet<PathBuf>> {
        self.dirs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_writable(&self, path: &Path) -> Result<(), String> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(format!("{}: storage is read-only", path.display()));
        }
        Ok(())
    }
}

impl StorageBackend for MemoryStorageBackend {
    fn read_text(&self, path: &Path) -> Result<Option<String>, StorageError> {
        Ok(self.files().get(path).cloned())
    }

    fn write_text(&self, path: &Path, content: &str) -> Result<(), StorageError> {
        self.check_writable(path).map_err(StorageError::WriteError)?;

        if let Some(parent) = path.parent() {
            self.dirs().insert(parent.to_path_buf());
        }
        self.files().insert(path.to_path_buf(), content.to_string());
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), StorageError> {
        self.check_writable(from).map_err(StorageError::WriteError)?;

        let mut files = self.files();
        let content = files
            .remove(from)
            .ok_or_else(|| StorageError::WriteError(format!("{}: not found", from.display())))?;
        files.insert(to.to_path_buf(), content);
        Ok(())
    }

    fn ensure_dir(&self, path: &Path) -> Result<(), StorageError> {
        self.check_writable(path).map_err(StorageError::DirError)?;

        self.dirs().insert(path.to_path_buf());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files().contains_key(path) || self.dirs().contains(path)
    }

    fn root(&self) -> &Path {
        &self.root
    }
}
