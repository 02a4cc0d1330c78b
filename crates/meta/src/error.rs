//! Metadata Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A metadata error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for metadata operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The file's extension does not map to any known book format.
    #[display("unsupported format: {_0}")]
    Unsupported(#[error(not(source))] String),
    /// The file claims a known format but its content cannot be parsed.
    #[display("unreadable book content: {_0}")]
    Unreadable(#[error(not(source))] String),
    /// The bytes could not be fetched from the file tree at all.
    #[display("storage error while reading book")]
    Storage,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage)
    }

    /// Whether this failure means "skip the file and move on" during a
    /// reconciliation pass, as opposed to an infrastructure fault.
    pub fn is_unreadable(&self) -> bool {
        matches!(self, Self::Unsupported(_) | Self::Unreadable(_))
    }
}
