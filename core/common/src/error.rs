//! Common error types for idcard.

use std::io::ErrorKind;
use std::path::PathBuf;

use thiserror::Error;

/// Boxed error used for causes that come from third-party libraries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error type for card operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Card metadata was not supplied at all.
    #[error("Missing metadata")]
    MissingMetadata,

    /// A required metadata or connection profile field is absent or empty.
    #[error("Required {scope} field not found: {field}")]
    MissingField {
        /// Either `metadata` or `connection`.
        scope: &'static str,
        field: &'static str,
    },

    /// The card schema version cannot be migrated to the current one.
    #[error("Incompatible card version {found}. Current version is {current}")]
    IncompatibleVersion { found: String, current: u64 },

    /// A required archive entry or directory file is absent or unreadable.
    #[error("Required file not found: {file}")]
    MissingFile {
        file: String,
        #[source]
        source: Option<Box<Error>>,
    },

    /// The card directory could not be accessed.
    #[error("Unable to read card directory: {}", path.display())]
    DirectoryAccess {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    /// Some step of writing a card directory failed.
    #[error("Failed to save card to directory: {}", path.display())]
    DirectorySave {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    /// A card file did not contain valid JSON.
    #[error("Invalid JSON in {file}: {source}")]
    Json {
        file: String,
        #[source]
        source: serde_json::Error,
    },

    /// The archive container could not be read or written.
    #[error("Archive error: {message}")]
    Archive {
        message: String,
        #[source]
        source: BoxError,
    },

    /// Native query execution failed.
    #[error("Query error: {0}")]
    Query(#[source] BoxError),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Filesystem operation on a specific path failed.
    #[error("I/O error on {}", path.display())]
    Path {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation not permitted.
    #[error("Not permitted: {0}")]
    NotPermitted(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),
}

impl Error {
    /// Wrap a JSON parse failure for the named card file.
    pub fn json(file: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json {
            file: file.into(),
            source,
        }
    }

    /// Wrap a filesystem failure with the path it happened on.
    pub fn path(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Path {
            path: path.into(),
            source,
        }
    }

    /// Whether the error means the resource does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io(e) | Self::Path { source: e, .. } => e.kind() == ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Whether the error means access to the resource was refused.
    pub fn is_not_permitted(&self) -> bool {
        match self {
            Self::NotPermitted(_) => true,
            Self::Io(e) | Self::Path { source: e, .. } => {
                e.kind() == ErrorKind::PermissionDenied
            }
            _ => false,
        }
    }

    /// Wrap an archive library failure.
    pub fn archive(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Archive {
            message: message.into(),
            source: source.into(),
        }
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
