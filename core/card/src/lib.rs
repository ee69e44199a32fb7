//! Identity cards for idcard.
//!
//! This module provides:
//! - The card model with schema migration and validation
//! - A zip archive codec
//! - A directory codec with permission masking
//! - Path-based loading that picks the right codec
//! - A callback-to-future query adapter
//!
//! # Architecture
//! Both codecs only build cards through [`CardModel::new`], so migration and
//! validation happen in one place whichever representation a card came
//! from.

pub mod archive;
pub mod directory;
pub mod loader;
pub mod model;
pub mod query;

pub use archive::{ArchiveCodec, ArchiveCompression, ArchiveData, ArchiveOptions, ArchiveOutput};
pub use directory::{DirectoryCodec, DirectoryOptions};
pub use loader::{load_card, save_card, CardFormat};
pub use model::{
    CardMetadata, CardModel, ConnectionProfile, Credentials, EnrollmentCredentials,
    CURRENT_VERSION,
};
pub use query::{CallbackQueryService, NativeQuery, QueryCallback, QueryService};
