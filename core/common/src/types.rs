//! Common types used throughout idcard.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unix permission bits applied when creating card files and directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileMode(u32);

impl FileMode {
    /// Most permissive mode for card directories: owner all, group read/execute.
    pub const CARD_DIR: Self = Self(0o750);

    /// Most permissive mode for card files: owner read/write, group read.
    pub const CARD_FILE: Self = Self(0o640);

    /// Create a mode from raw permission bits.
    pub fn new(bits: u32) -> Self {
        Self(bits & 0o7777)
    }

    /// Get the raw permission bits.
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Clear every bit that is set in the umask.
    pub fn masked(self, umask: Umask) -> Self {
        Self(self.0 & !umask.bits())
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04o}", self.0)
    }
}

/// File mode creation mask.
///
/// Directory encoding takes the mask as a value instead of consulting the
/// process, so callers (and tests) decide which mask is in force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Umask(u32);

impl Umask {
    /// The conventional `022` mask.
    pub const DEFAULT: Self = Self(0o022);

    /// Create a umask from raw bits.
    pub fn new(bits: u32) -> Self {
        Self(bits & 0o777)
    }

    /// Get the raw mask bits.
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Read the current process umask.
    ///
    /// On Linux the mask is taken from `/proc/self/status`. Elsewhere it can
    /// only be read by setting it, so it is swapped out and restored
    /// immediately; files created by other threads in between get the
    /// temporary `077` mask, so call it before any I/O starts.
    pub fn process() -> Self {
        Self::from_proc_status().unwrap_or_else(Self::swap_process)
    }

    #[cfg(target_os = "linux")]
    fn from_proc_status() -> Option<Self> {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        Self::parse_status(&status)
    }

    #[cfg(not(target_os = "linux"))]
    fn from_proc_status() -> Option<Self> {
        None
    }

    /// Find the `Umask:` line of a `/proc/<pid>/status` document.
    #[cfg_attr(not(target_os = "linux"), allow(dead_code))]
    fn parse_status(status: &str) -> Option<Self> {
        status
            .lines()
            .find_map(|line| line.strip_prefix("Umask:"))
            .and_then(|bits| u32::from_str_radix(bits.trim(), 8).ok())
            .map(Self::new)
    }

    #[cfg(unix)]
    fn swap_process() -> Self {
        use nix::sys::stat::{umask, Mode};

        let current = umask(Mode::from_bits_truncate(0o077));
        umask(current);
        Self::new(u32::from(current.bits()))
    }

    #[cfg(not(unix))]
    fn swap_process() -> Self {
        Self::new(0)
    }
}

impl Default for Umask {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Umask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04o}", self.0)
    }
}

/// Check that `name` can be used as a single file name inside a card.
///
/// # Errors
/// - Name is empty, `.` or `..`
/// - Name contains a path separator
pub fn validate_entry_name(name: &str) -> crate::Result<()> {
    if name.is_empty() {
        return Err(crate::Error::InvalidInput(
            "Entry name cannot be empty".to_string(),
        ));
    }
    if name == "." || name == ".." {
        return Err(crate::Error::InvalidInput(format!(
            "Entry name cannot be '{}'",
            name
        )));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(crate::Error::InvalidInput(format!(
            "Entry name cannot contain separators: {}",
            name
        )));
    }
    Ok(())
}
