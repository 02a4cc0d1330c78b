//! File tree trait and implementations.
//!
//! [`FileTree`] is the seam between the reconciliation engine and the actual
//! filesystem. [`LocalTree`] backs it with `tokio::fs` and the `zip` crate;
//! [`MockTree`] (behind the `mock` feature) is an in-memory double for tests.

mod local;
#[cfg(feature = "mock")]
mod mock;

pub use self::local::LocalTree;
#[cfg(feature = "mock")]
pub use self::mock::MockTree;
use crate::error::Result;
use crate::file::{DirEntry, FileRef, Fingerprint};
use async_trait::async_trait;
use std::path::Path;

/// Read-mostly view of a library directory tree.
///
/// All paths are relative to the tree's root and are validated with
/// [`validate_path`](crate::validate_path) by implementations. The only
/// mutating operation is [`delete`](Self::delete), reserved for the explicit
/// user-initiated "remove book and delete file" path; reconciliation itself
/// never writes.
#[async_trait]
pub trait FileTree: Send + Sync {
    /// Name of the configured tree, used for logging only.
    fn name(&self) -> &str;

    /// List the immediate children of a directory. An empty `dir` means the
    /// tree root. Listing a directory that does not exist yields an empty
    /// vector rather than an error, so a freshly-configured empty library
    /// reconciles cleanly.
    ///
    /// Symbolic links are not followed; loop protection during traversal is
    /// the caller's responsibility on top of that.
    async fn children(&self, dir: &Path) -> Result<Vec<DirEntry>>;

    /// Check whether a physical file exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Cheap change signature (size + mtime) for a physical file.
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if missing.
    async fn fingerprint(&self, path: &Path) -> Result<Fingerprint>;

    /// Read the complete contents of a file reference: plain file bytes, or
    /// a single decompressed member for archive entries.
    ///
    /// Builtin references have no backing in any tree and yield
    /// [`Virtual`](crate::error::ErrorKind::Virtual); callers resolve those
    /// against their own bundled assets.
    async fn read(&self, file: &FileRef) -> Result<Vec<u8>>;

    /// Enumerate the member names of an archive container, in the order the
    /// archive's directory lists them. Directory entries are skipped.
    ///
    /// Each call re-opens the archive; the returned listing is a finite
    /// snapshot, not a restartable cursor.
    async fn archive_entries(&self, archive: &Path) -> Result<Vec<String>>;

    /// Delete a physical file. User-initiated removal only.
    async fn delete(&self, path: &Path) -> Result<()>;
}
