//! Common utilities and types shared across the idcard crates.
//!
//! This module provides the workspace error type and the small value types
//! (file modes, umask, entry names) that both the storage providers and the
//! card codecs agree on.

pub mod error;
pub mod types;

pub use error::{BoxError, Error, Result};
pub use types::{validate_entry_name, FileMode, Umask};
