//! Card directory codec.
//!
//! A card directory mirrors the archive layout with real files:
//! `metadata.json`, `connection.json` and an optional `credentials/`
//! directory holding one file per credential.

use futures::future::try_join_all;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::model::{
    parse_document, CardModel, Credentials, CONNECTION_FILENAME, CREDENTIALS_DIRNAME,
    METADATA_FILENAME,
};
use idcard_common::{validate_entry_name, Error, FileMode, Result, Umask};
use idcard_storage::StorageProvider;

/// Options for directory encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectoryOptions {
    /// Mask cleared from the card directory and file modes.
    pub umask: Umask,
}

impl DirectoryOptions {
    /// Create options with the given umask.
    pub fn new(umask: Umask) -> Self {
        Self { umask }
    }

    /// Create options using the current process umask.
    pub fn from_process() -> Self {
        Self::new(Umask::process())
    }

    /// Set the umask.
    pub fn with_umask(mut self, umask: Umask) -> Self {
        self.umask = umask;
        self
    }

    /// Mode for card directories: at most `0750`.
    pub fn dir_mode(&self) -> FileMode {
        FileMode::CARD_DIR.masked(self.umask)
    }

    /// Mode for card files: at most `0640`.
    pub fn file_mode(&self) -> FileMode {
        FileMode::CARD_FILE.masked(self.umask)
    }
}

/// Reads and writes cards as directories through a storage provider.
pub struct DirectoryCodec {
    provider: Arc<dyn StorageProvider>,
    options: DirectoryOptions,
}

impl DirectoryCodec {
    /// Create a codec over `provider` with default options.
    pub fn new(provider: Arc<dyn StorageProvider>) -> Self {
        Self {
            provider,
            options: DirectoryOptions::default(),
        }
    }

    /// Replace the encoding options.
    pub fn with_options(mut self, options: DirectoryOptions) -> Self {
        self.options = options;
        self
    }

    /// Get the storage provider.
    pub fn provider(&self) -> &Arc<dyn StorageProvider> {
        &self.provider
    }

    /// Encoding options in use.
    pub fn options(&self) -> &DirectoryOptions {
        &self.options
    }

    /// Load a card from a directory.
    ///
    /// A missing or unreadable `credentials/` directory means the card has
    /// no credentials. Failures reading individual credential files inside
    /// an existing directory are returned.
    ///
    /// # Errors
    /// - `DirectoryAccess` if the directory cannot be reached
    /// - `MissingFile` if `metadata.json` or `connection.json` cannot be read
    /// - `Json` if either document is not valid JSON
    /// - Any card construction error
    pub async fn decode(&self, dir: impl AsRef<Path>) -> Result<CardModel> {
        let dir = dir.as_ref();
        debug!(path = %dir.display(), provider = self.provider.name(), "Loading card directory");

        self.provider
            .access(dir)
            .await
            .map_err(|e| Error::DirectoryAccess {
                path: dir.to_path_buf(),
                source: Box::new(e),
            })?;

        let metadata = self.read_required(dir, METADATA_FILENAME).await?;
        let metadata = parse_document(METADATA_FILENAME, &metadata)?;

        let connection = self.read_required(dir, CONNECTION_FILENAME).await?;
        let connection = parse_document(CONNECTION_FILENAME, &connection)?;

        let credentials = self.read_credentials(&dir.join(CREDENTIALS_DIRNAME)).await?;

        let mut card = CardModel::from_documents(metadata, connection)?;
        card.set_credentials(credentials);

        info!(
            path = %dir.display(),
            user = card.user_name(),
            credentials = card.credentials().len(),
            "Card loaded from directory"
        );
        Ok(card)
    }

    /// Save a card to a directory, creating it if needed.
    ///
    /// Steps run in order: card directory, `metadata.json`,
    /// `connection.json`, `credentials/`, then every credential file
    /// concurrently. Files already written stay on disk when a later step
    /// fails.
    ///
    /// # Errors
    /// - `DirectorySave` wrapping the first failure
    pub async fn encode(&self, card: &CardModel, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();

        self.write_card(card, dir).await.map_err(|e| {
            error!(path = %dir.display(), error = %e, "Failed to save card");
            Error::DirectorySave {
                path: dir.to_path_buf(),
                source: Box::new(e),
            }
        })?;

        info!(
            path = %dir.display(),
            user = card.user_name(),
            credentials = card.credentials().len(),
            "Card saved to directory"
        );
        Ok(())
    }

    async fn read_required(&self, dir: &Path, file: &str) -> Result<String> {
        self.provider
            .read_to_string(&dir.join(file))
            .await
            .map_err(|e| Error::MissingFile {
                file: file.to_string(),
                source: Some(Box::new(e)),
            })
    }

    async fn read_credentials(&self, credentials_dir: &Path) -> Result<Credentials> {
        let entries = match self.provider.list(credentials_dir).await {
            Ok(entries) => entries,
            Err(e) if e.is_not_found() => {
                debug!(path = %credentials_dir.display(), "No credentials directory");
                return Ok(Credentials::new());
            }
            Err(e) if e.is_not_permitted() || matches!(e, Error::InvalidInput(_)) => {
                warn!(
                    path = %credentials_dir.display(),
                    error = %e,
                    "Ignored unreadable credentials directory"
                );
                return Ok(Credentials::new());
            }
            Err(e) => return Err(e),
        };

        let reads = entries
            .into_iter()
            .filter(|entry| !entry.is_directory)
            .filter(|entry| match validate_entry_name(&entry.name) {
                Ok(()) => true,
                Err(_) => {
                    warn!(name = %entry.name, "Skipping credential with unusable name");
                    false
                }
            })
            .map(|entry| async move {
                let content = self
                    .provider
                    .read_to_string(&credentials_dir.join(&entry.name))
                    .await?;
                Ok::<_, Error>((entry.name, content))
            });

        Ok(try_join_all(reads).await?.into_iter().collect())
    }

    async fn write_card(&self, card: &CardModel, dir: &Path) -> Result<()> {
        for name in card.credentials().keys() {
            validate_entry_name(name)?;
        }

        let dir_mode = self.options.dir_mode();
        let file_mode = self.options.file_mode();

        self.provider.create_dir_all(dir, dir_mode).await?;

        self.provider
            .write(
                &dir.join(METADATA_FILENAME),
                card.metadata_json()?.into_bytes(),
                file_mode,
            )
            .await?;
        self.provider
            .write(
                &dir.join(CONNECTION_FILENAME),
                card.connection_json()?.into_bytes(),
                file_mode,
            )
            .await?;

        let credentials_dir = dir.join(CREDENTIALS_DIRNAME);
        self.provider
            .create_dir_all(&credentials_dir, dir_mode)
            .await?;

        let writes = card.credentials().iter().map(|(name, content)| {
            let path = credentials_dir.join(name);
            let data = content.clone().into_bytes();
            async move { self.provider.write(&path, data, file_mode).await }
        });
        try_join_all(writes).await?;

        Ok(())
    }
}
