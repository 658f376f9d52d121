//! Local filesystem storage backend.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::storage::{StorageBackend, StorageError};

/// Storage backend for local filesystem operations.
pub struct LocalStorageBackend {
    root: PathBuf,
}

impl LocalStorageBackend {
    /// Create a new local storage backend rooted at the given path.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl StorageBackend for LocalStorageBackend {
    fn read_text(&self, path: &Path) -> Result<Option<String>, StorageError> {
        let full_path = self.root.join(path);

        let bytes = match fs::read(&full_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StorageError::ReadError(format!(
                    "{}: {e}",
                    full_path.display()
                )));
            }
        };

        match String::from_utf8(bytes) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) => {
                tracing::warn!(
                    path = %full_path.display(),
                    error = %e.utf8_error(),
                    "document is not valid UTF-8, replacing bad bytes"
                );
                Ok(Some(String::from_utf8_lossy(e.as_bytes()).into_owned()))
            }
        }
    }

    fn write_text(&self, path: &Path, content: &str) -> Result<(), StorageError> {
        let full_path = self.root.join(path);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                StorageError::WriteError(format!("create dir {}: {e}", parent.display()))
            })?;
        }

        let tmp_path = temp_path(&full_path);
        let written =
            write_synced(&tmp_path, content).and_then(|()| fs::rename(&tmp_path, &full_path));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(StorageError::WriteError(format!(
                "{}: {e}",
                full_path.display()
            )));
        }
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), StorageError> {
        let from = self.root.join(from);
        let to = self.root.join(to);

        fs::rename(&from, &to).map_err(|e| {
            StorageError::WriteError(format!("{} -> {}: {e}", from.display(), to.display()))
        })
    }

    fn ensure_dir(&self, path: &Path) -> Result<(), StorageError> {
        let full_path = self.root.join(path);

        fs::create_dir_all(&full_path)
            .map_err(|e| StorageError::DirError(format!("{}: {e}", full_path.display())))
    }

    fn exists(&self, path: &Path) -> bool {
        self.root.join(path).exists()
    }

    fn root(&self) -> &Path {
        &self.root
    }
}

/// Sibling of `path` that new content is written to before the rename.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_synced(path: &Path, content: &str) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()
}
