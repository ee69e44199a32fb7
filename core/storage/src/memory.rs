//! In-memory storage provider for testing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::provider::{Metadata, StorageProvider};
use idcard_common::{Error, FileMode, Result};

/// In-memory storage entry.
#[derive(Debug, Clone)]
enum Entry {
    File {
        data: Vec<u8>,
        mode: FileMode,
        modified: DateTime<Utc>,
    },
    Directory {
        mode: FileMode,
        modified: DateTime<Utc>,
    },
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<PathBuf, Entry>,
    denied: HashSet<PathBuf>,
}

/// In-memory storage provider.
///
/// Useful for testing. Paths are normalized to absolute form, so `cards/a`
/// and `/cards/a` name the same entry. Paths can be marked as denied to
/// simulate permission failures.
#[derive(Debug)]
pub struct MemoryProvider {
    state: RwLock<State>,
}

impl MemoryProvider {
    /// Create a new provider holding only the root directory.
    pub fn new() -> Self {
        let mut state = State::default();
        state.entries.insert(
            PathBuf::from("/"),
            Entry::Directory {
                mode: FileMode::new(0o755),
                modified: Utc::now(),
            },
        );

        Self {
            state: RwLock::new(state),
        }
    }

    /// Refuse every operation that touches `path` with `NotPermitted`.
    pub fn deny(&self, path: impl AsRef<Path>) {
        let key = Self::key(path.as_ref());
        self.write_state().denied.insert(key);
    }

    /// Raw mode recorded for a path, if it exists.
    pub fn mode(&self, path: impl AsRef<Path>) -> Option<FileMode> {
        let key = Self::key(path.as_ref());
        self.read_state().entries.get(&key).map(|entry| match entry {
            Entry::File { mode, .. } | Entry::Directory { mode, .. } => *mode,
        })
    }

    fn key(path: &Path) -> PathBuf {
        let mut key = PathBuf::from("/");
        for component in path.components() {
            match component {
                Component::Normal(part) => key.push(part),
                Component::ParentDir => {
                    key.pop();
                }
                Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            }
        }
        key
    }

    fn read_state(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_allowed(state: &State, key: &Path) -> Result<()> {
        if state.denied.contains(key) {
            return Err(Error::NotPermitted(format!(
                "Permission denied: {}",
                key.display()
            )));
        }
        Ok(())
    }

    fn to_metadata(key: &Path, entry: &Entry) -> Metadata {
        let name = key
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "/".to_string());

        match entry {
            Entry::File {
                data,
                mode,
                modified,
            } => Metadata {
                name,
                size: Some(data.len() as u64),
                is_directory: false,
                modified: *modified,
                mode: Some(*mode),
            },
            Entry::Directory { mode, modified } => Metadata {
                name,
                size: None,
                is_directory: true,
                modified: *modified,
                mode: Some(*mode),
            },
        }
    }
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageProvider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    async fn access(&self, path: &Path) -> Result<()> {
        let key = Self::key(path);
        let state = self.read_state();
        Self::check_allowed(&state, &key)?;

        if state.entries.contains_key(&key) {
            Ok(())
        } else {
            Err(Error::NotFound(format!("Path not found: {}", key.display())))
        }
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let key = Self::key(path);
        Ok(self.read_state().entries.contains_key(&key))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let key = Self::key(path);
        let state = self.read_state();
        Self::check_allowed(&state, &key)?;

        match state.entries.get(&key) {
            Some(Entry::File { data, .. }) => Ok(data.clone()),
            Some(Entry::Directory { .. }) => Err(Error::InvalidInput(format!(
                "Cannot read directory: {}",
                key.display()
            ))),
            None => Err(Error::NotFound(format!("File not found: {}", key.display()))),
        }
    }

    async fn write(&self, path: &Path, data: Vec<u8>, mode: FileMode) -> Result<Metadata> {
        let key = Self::key(path);
        let mut state = self.write_state();
        Self::check_allowed(&state, &key)?;

        if let Some(parent) = key.parent() {
            Self::check_allowed(&state, parent)?;
            match state.entries.get(parent) {
                Some(Entry::Directory { .. }) => {}
                Some(Entry::File { .. }) => {
                    return Err(Error::InvalidInput("Parent is a file".to_string()));
                }
                None => {
                    return Err(Error::NotFound(format!(
                        "Parent directory not found: {}",
                        parent.display()
                    )));
                }
            }
        }

        let mode = match state.entries.get(&key) {
            Some(Entry::Directory { .. }) => {
                return Err(Error::InvalidInput(format!(
                    "Cannot write directory: {}",
                    key.display()
                )));
            }
            Some(Entry::File { mode, .. }) => *mode,
            None => mode,
        };

        let entry = Entry::File {
            data,
            mode,
            modified: Utc::now(),
        };
        let metadata = Self::to_metadata(&key, &entry);
        state.entries.insert(key, entry);

        Ok(metadata)
    }

    async fn list(&self, path: &Path) -> Result<Vec<Metadata>> {
        let key = Self::key(path);
        let state = self.read_state();
        Self::check_allowed(&state, &key)?;

        match state.entries.get(&key) {
            Some(Entry::Directory { .. }) => {}
            Some(Entry::File { .. }) => {
                return Err(Error::InvalidInput(format!(
                    "Not a directory: {}",
                    key.display()
                )));
            }
            None => {
                return Err(Error::NotFound(format!(
                    "Directory not found: {}",
                    key.display()
                )));
            }
        }

        let results = state
            .entries
            .iter()
            .filter(|(entry_key, _)| entry_key.parent() == Some(key.as_path()))
            .map(|(entry_key, entry)| Self::to_metadata(entry_key, entry))
            .collect();

        Ok(results)
    }

    async fn metadata(&self, path: &Path) -> Result<Metadata> {
        let key = Self::key(path);
        let state = self.read_state();
        Self::check_allowed(&state, &key)?;

        state
            .entries
            .get(&key)
            .map(|entry| Self::to_metadata(&key, entry))
            .ok_or_else(|| Error::NotFound(format!("Path not found: {}", key.display())))
    }

    async fn create_dir_all(&self, path: &Path, mode: FileMode) -> Result<()> {
        let key = Self::key(path);
        let mut state = self.write_state();

        let mut current = PathBuf::from("/");
        for component in key.components().skip(1) {
            current.push(component);
            Self::check_allowed(&state, &current)?;

            match state.entries.get(&current) {
                Some(Entry::Directory { .. }) => {}
                Some(Entry::File { .. }) => {
                    return Err(Error::AlreadyExists(format!(
                        "Path exists as a file: {}",
                        current.display()
                    )));
                }
                None => {
                    state.entries.insert(
                        current.clone(),
                        Entry::Directory {
                            mode,
                            modified: Utc::now(),
                        },
                    );
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_read() {
        let provider = MemoryProvider::new();
        let path = Path::new("/test.txt");
        let data = b"Hello, World!".to_vec();

        provider
            .write(path, data.clone(), FileMode::CARD_FILE)
            .await
            .unwrap();
        let read = provider.read(path).await.unwrap();

        assert_eq!(read, data);
        assert_eq!(provider.mode(path), Some(FileMode::CARD_FILE));
    }

    #[tokio::test]
    async fn test_relative_and_absolute_paths_match() {
        let provider = MemoryProvider::new();
        provider
            .create_dir_all(Path::new("cards/./alice"), FileMode::CARD_DIR)
            .await
            .unwrap();

        assert!(provider.exists(Path::new("/cards/alice")).await.unwrap());
        assert!(provider.exists(Path::new("/cards")).await.unwrap());
    }

    #[tokio::test]
    async fn test_write_requires_parent() {
        let provider = MemoryProvider::new();
        let result = provider
            .write(Path::new("/missing/file"), vec![1], FileMode::CARD_FILE)
            .await;

        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_overwrite_keeps_mode() {
        let provider = MemoryProvider::new();
        let path = Path::new("/file");

        provider
            .write(path, vec![1], FileMode::new(0o600))
            .await
            .unwrap();
        provider
            .write(path, vec![2], FileMode::new(0o644))
            .await
            .unwrap();

        assert_eq!(provider.mode(path), Some(FileMode::new(0o600)));
        assert_eq!(provider.read(path).await.unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_create_dir_all_through_file_fails() {
        let provider = MemoryProvider::new();
        provider
            .write(Path::new("/blocked"), vec![], FileMode::CARD_FILE)
            .await
            .unwrap();

        let result = provider
            .create_dir_all(Path::new("/blocked/card"), FileMode::CARD_DIR)
            .await;
        assert!(matches!(result, Err(Error::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_list_direct_children_only() {
        let provider = MemoryProvider::new();

        provider
            .create_dir_all(Path::new("/dir/sub"), FileMode::CARD_DIR)
            .await
            .unwrap();
        provider
            .write(Path::new("/dir/file1.txt"), vec![1], FileMode::CARD_FILE)
            .await
            .unwrap();
        provider
            .write(Path::new("/dir/sub/file2.txt"), vec![2], FileMode::CARD_FILE)
            .await
            .unwrap();

        let contents = provider.list(Path::new("/dir")).await.unwrap();
        assert_eq!(contents.len(), 2);
        assert!(contents.iter().any(|m| m.name == "sub" && m.is_directory));
        assert!(contents.iter().any(|m| m.name == "file1.txt"));
    }

    #[tokio::test]
    async fn test_denied_paths() {
        let provider = MemoryProvider::new();
        provider
            .create_dir_all(Path::new("/secret"), FileMode::CARD_DIR)
            .await
            .unwrap();
        provider.deny("/secret");

        assert!(matches!(
            provider.list(Path::new("/secret")).await,
            Err(Error::NotPermitted(_))
        ));
        assert!(matches!(
            provider.access(Path::new("/secret")).await,
            Err(Error::NotPermitted(_))
        ));
        assert!(matches!(
            provider
                .write(Path::new("/secret/x"), vec![], FileMode::CARD_FILE)
                .await,
            Err(Error::NotPermitted(_))
        ));
    }
}
