//! Load and save cards by path, picking the codec from the card format.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use crate::archive::{ArchiveCodec, ArchiveOptions};
use crate::directory::{DirectoryCodec, DirectoryOptions};
use crate::model::CardModel;
use idcard_common::{Error, Result};
use idcard_storage::StorageProvider;

/// Physical representation of a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardFormat {
    /// Single zip archive file.
    Archive,
    /// Directory tree.
    Directory,
}

impl CardFormat {
    /// Guess the format of a path that does not exist yet.
    ///
    /// Paths ending in `.card` or `.zip` are archives; anything else is a
    /// directory.
    pub fn for_new_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("card") || ext.eq_ignore_ascii_case("zip") => {
                Self::Archive
            }
            _ => Self::Directory,
        }
    }
}

impl fmt::Display for CardFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Archive => write!(f, "archive"),
            Self::Directory => write!(f, "directory"),
        }
    }
}

impl FromStr for CardFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "archive" | "card" | "zip" => Ok(Self::Archive),
            "directory" | "dir" => Ok(Self::Directory),
            _ => Err(Error::InvalidInput(format!(
                "Unknown card format '{}'. Use: archive or directory",
                s
            ))),
        }
    }
}

/// Load a card from a path, reading directories with the directory codec
/// and files with the archive codec.
///
/// # Errors
/// - `DirectoryAccess` if the path cannot be reached
/// - Any codec error
pub async fn load_card(provider: Arc<dyn StorageProvider>, path: &Path) -> Result<CardModel> {
    let metadata = provider
        .metadata(path)
        .await
        .map_err(|e| Error::DirectoryAccess {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;

    if metadata.is_directory {
        DirectoryCodec::new(provider).decode(path).await
    } else {
        debug!(path = %path.display(), size = ?metadata.size, "Reading card archive file");
        let bytes = provider.read(path).await?;
        ArchiveCodec::new().decode(bytes).await
    }
}

/// Save a card to a path in the given format.
///
/// Archives are written as a single file with the card file mode; the
/// parent directory must exist.
pub async fn save_card(
    provider: Arc<dyn StorageProvider>,
    card: &CardModel,
    path: &Path,
    format: CardFormat,
    options: DirectoryOptions,
) -> Result<()> {
    match format {
        CardFormat::Directory => {
            DirectoryCodec::new(provider)
                .with_options(options)
                .encode(card, path)
                .await
        }
        CardFormat::Archive => {
            let bytes = ArchiveCodec::with_options(ArchiveOptions::new())
                .encode(card)
                .await?
                .into_bytes()?;
            provider.write(path, bytes, options.file_mode()).await?;
            debug!(path = %path.display(), "Card archive saved");
            Ok(())
        }
    }
}
