//! Storage backend trait and implementations.
//!
//! The palace never touches the filesystem directly. Everything it persists
//! goes through a [`StorageBackend`], which exposes four text-oriented
//! primitives over paths relative to the backend's root. The local backend
//! writes real files; the memory backend keeps them in a map, which is what
//! tests and throwaway sessions use.

pub mod local;
pub mod memory;

use std::path::Path;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to read: {0}")]
    ReadError(String),

    #[error("Failed to write: {0}")]
    WriteError(String),

    #[error("Failed to create directory: {0}")]
    DirError(String),

    #[error("Failed to serialize: {0}")]
    SerializeError(String),
}

/// Trait for storage backends (local filesystem, in-memory, etc.).
///
/// Paths are relative to [`StorageBackend::root`].
pub trait StorageBackend: Send + Sync {
    /// Read a text document.
    ///
    /// Returns `Ok(None)` when nothing is stored at `path`. Bytes that are not
    /// valid UTF-8 are replaced rather than failing the read.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::ReadError` if the document exists but cannot be read.
    fn read_text(&self, path: &Path) -> Result<Option<String>, StorageError>;

    /// Write a text document, replacing any previous content.
    ///
    /// The previous content stays intact until the new content is complete.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::WriteError` if the document cannot be written.
    fn write_text(&self, path: &Path, content: &str) -> Result<(), StorageError>;

    /// Move a document to a new path, replacing anything stored there.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::WriteError` if nothing is stored at `from` or
    /// the move fails.
    fn rename(&self, from: &Path, to: &Path) -> Result<(), StorageError>;

    /// Create a directory (and its parents) if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::DirError` if the directory cannot be created.
    fn ensure_dir(&self, path: &Path) -> Result<(), StorageError>;

    /// Check if a path exists in storage.
    fn exists(&self, path: &Path) -> bool;

    /// Get the root path/identifier for this storage backend.
    fn root(&self) -> &Path;
}
