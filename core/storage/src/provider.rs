//! Storage provider trait definition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use idcard_common::{Error, FileMode, Result};

/// Metadata for a stored object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// Name of the object (last path component).
    pub name: String,
    /// Size in bytes (None for directories).
    pub size: Option<u64>,
    /// Whether this is a directory.
    pub is_directory: bool,
    /// Last modification time.
    pub modified: DateTime<Utc>,
    /// Permission bits, when the backend tracks them.
    pub mode: Option<FileMode>,
}

/// Storage provider trait for card directories.
///
/// Paths are plain filesystem-style paths. Implementations map their own
/// failures onto the common error kinds so callers can tell an absent path
/// (`NotFound`) from a refused one (`NotPermitted`).
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Get the provider name (e.g., "local", "memory").
    fn name(&self) -> &str;

    /// Check that a path exists and can be reached.
    ///
    /// # Errors
    /// - Path not found
    /// - Permission denied
    async fn access(&self, path: &Path) -> Result<()>;

    /// Check if a path exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Read the full content of a file.
    ///
    /// # Errors
    /// - File not found
    /// - Path is a directory
    /// - Permission denied
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Read a file as UTF-8 text.
    async fn read_to_string(&self, path: &Path) -> Result<String> {
        let data = self.read(path).await?;
        String::from_utf8(data).map_err(|e| {
            Error::Serialization(format!("{} is not valid UTF-8: {}", path.display(), e))
        })
    }

    /// Write a file, creating or truncating it.
    ///
    /// # Preconditions
    /// - Parent directory must exist
    ///
    /// # Postconditions
    /// - A newly created file carries `mode`; an existing file keeps its mode
    ///
    /// # Errors
    /// - Parent directory not found
    /// - Path is a directory
    /// - Permission denied
    async fn write(&self, path: &Path, data: Vec<u8>, mode: FileMode) -> Result<Metadata>;

    /// List the direct children of a directory.
    ///
    /// # Errors
    /// - Directory not found
    /// - Path is not a directory
    /// - Permission denied
    async fn list(&self, path: &Path) -> Result<Vec<Metadata>>;

    /// Get metadata for a path.
    async fn metadata(&self, path: &Path) -> Result<Metadata>;

    /// Create a directory and any missing parents.
    ///
    /// # Postconditions
    /// - Newly created directories carry `mode`
    /// - Existing directories are left untouched
    ///
    /// # Errors
    /// - A path component exists as a file
    /// - Permission denied
    async fn create_dir_all(&self, path: &Path, mode: FileMode) -> Result<()>;
}
