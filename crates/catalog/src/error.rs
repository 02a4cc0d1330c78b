//! Catalog Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A catalog error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// Per-file problems during a reconciliation pass are *not* errors; they are
/// skip outcomes in the build report. These kinds cover failures of the
/// operation itself.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("persistence gateway error")]
    Gateway,
    #[display("file tree error")]
    Tree,
    #[display("metadata error")]
    Metadata,
    #[display("a reconciliation pass is already running")]
    AlreadyBuilding,
    #[display("the reconciliation pass panicked")]
    Panicked,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Gateway | Self::Tree | Self::AlreadyBuilding)
    }
}
