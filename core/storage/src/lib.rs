//! Storage provider abstraction for idcard.
//!
//! Card directories are read and written through the [`StorageProvider`]
//! trait so the directory codec never touches the filesystem directly. Two
//! providers ship with the crate:
//! - [`LocalProvider`] backed by `tokio::fs`, applying unix permission modes
//! - [`MemoryProvider`] holding a whole tree in memory, used by tests
//!
//! # Design Principles
//! - Async operations: All I/O operations are async
//! - Unified error semantics: missing paths are `NotFound`, refused access is
//!   `NotPermitted`, reading a file as a directory is `InvalidInput`

pub mod local;
pub mod memory;
pub mod provider;

pub use local::LocalProvider;
pub use memory::MemoryProvider;
pub use provider::{Metadata, StorageProvider};
