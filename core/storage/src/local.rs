//! Local filesystem storage provider.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::provider::{Metadata, StorageProvider};
use idcard_common::{Error, FileMode, Result};

/// Local filesystem storage provider.
///
/// Operates on real paths through `tokio::fs`. On unix, new files and
/// directories are created with the requested mode; the operating system
/// still applies the process umask on top of it.
#[derive(Debug, Default, Clone)]
pub struct LocalProvider;

impl LocalProvider {
    /// Create a new local provider.
    pub fn new() -> Self {
        Self
    }

    /// Create metadata from filesystem metadata.
    fn create_metadata(path: &Path, fs_meta: std::fs::Metadata) -> Metadata {
        let modified: DateTime<Utc> = fs_meta
            .modified()
            .map(|t| t.into())
            .unwrap_or_else(|_| Utc::now());

        Metadata {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "/".to_string()),
            size: if fs_meta.is_file() {
                Some(fs_meta.len())
            } else {
                None
            },
            is_directory: fs_meta.is_dir(),
            modified,
            mode: Self::mode_of(&fs_meta),
        }
    }

    #[cfg(unix)]
    fn mode_of(fs_meta: &std::fs::Metadata) -> Option<FileMode> {
        use std::os::unix::fs::PermissionsExt;
        Some(FileMode::new(fs_meta.permissions().mode()))
    }

    #[cfg(not(unix))]
    fn mode_of(_fs_meta: &std::fs::Metadata) -> Option<FileMode> {
        None
    }
}

/// Attach the path to an I/O failure, keeping the OS error as the cause.
fn map_io(err: io::Error, path: &Path) -> Error {
    Error::path(path, err)
}

#[async_trait]
impl StorageProvider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn access(&self, path: &Path) -> Result<()> {
        fs::metadata(path).await.map_err(|e| map_io(e, path))?;
        Ok(())
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        match fs::metadata(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(map_io(e, path)),
        }
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let fs_meta = fs::metadata(path).await.map_err(|e| map_io(e, path))?;
        if fs_meta.is_dir() {
            return Err(Error::InvalidInput(format!(
                "Cannot read directory: {}",
                path.display()
            )));
        }

        fs::read(path).await.map_err(|e| map_io(e, path))
    }

    async fn write(&self, path: &Path, data: Vec<u8>, mode: FileMode) -> Result<Metadata> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !fs::try_exists(parent).await.map_err(|e| map_io(e, parent))? {
                return Err(Error::NotFound(format!(
                    "Parent directory not found: {}",
                    parent.display()
                )));
            }
        }

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(mode.bits());
        #[cfg(not(unix))]
        let _ = mode;

        let mut file = options.open(path).await.map_err(|e| map_io(e, path))?;
        file.write_all(&data).await.map_err(|e| map_io(e, path))?;
        file.flush().await.map_err(|e| map_io(e, path))?;

        debug!(path = %path.display(), size = data.len(), "File written");

        let fs_meta = fs::metadata(path).await.map_err(|e| map_io(e, path))?;
        Ok(Self::create_metadata(path, fs_meta))
    }

    async fn list(&self, path: &Path) -> Result<Vec<Metadata>> {
        let fs_meta = fs::metadata(path).await.map_err(|e| map_io(e, path))?;
        if !fs_meta.is_dir() {
            return Err(Error::InvalidInput(format!(
                "Not a directory: {}",
                path.display()
            )));
        }

        let mut results = Vec::new();
        let mut entries = fs::read_dir(path).await.map_err(|e| map_io(e, path))?;

        while let Some(entry) = entries.next_entry().await.map_err(|e| map_io(e, path))? {
            let entry_path = entry.path();
            let fs_meta = entry
                .metadata()
                .await
                .map_err(|e| map_io(e, &entry_path))?;
            results.push(Self::create_metadata(&entry_path, fs_meta));
        }

        Ok(results)
    }

    async fn metadata(&self, path: &Path) -> Result<Metadata> {
        let fs_meta = fs::metadata(path).await.map_err(|e| map_io(e, path))?;
        Ok(Self::create_metadata(path, fs_meta))
    }

    async fn create_dir_all(&self, path: &Path, mode: FileMode) -> Result<()> {
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(mode.bits());
        #[cfg(not(unix))]
        let _ = mode;

        builder.create(path).await.map_err(|e| map_io(e, path))?;
        debug!(path = %path.display(), mode = %mode, "Directory ready");
        Ok(())
    }
}
