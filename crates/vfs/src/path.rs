//! Root-relative path validation.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates and normalizes a library-relative path.
///
/// Rejects anything that would escape the library root (`..` past the top),
/// absolute/prefixed paths, null bytes, and paths that normalize to nothing.
/// Returns the cleaned path on success.
///
/// ```
/// use folio_vfs::validate_path;
/// assert!(validate_path("shelf/novel.epub").is_ok());
/// assert!(validate_path("../etc/passwd").is_err());
/// assert_eq!(
///     validate_path("shelf/./sub/../novel.epub").unwrap(),
///     std::path::Path::new("shelf/novel.epub"),
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let invalid = || ErrorKind::InvalidPath(path.to_path_buf());
    let mut cleaned = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => {
                // Null bytes survive Path::components() on Unix but truncate
                // in C-based syscalls.
                if part.as_encoded_bytes().contains(&0) {
                    exn::bail!(invalid());
                }
                cleaned.push(part);
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(invalid()),
            Component::ParentDir => {
                if cleaned.pop().is_none() {
                    exn::bail!(invalid());
                }
            },
        }
    }
    if cleaned.is_empty() {
        exn::bail!(invalid());
    }
    Ok(cleaned.into_iter().collect())
}

/// Same as [`validate`], but an empty path means "the library root itself"
/// and is allowed. Used for directory listings.
pub(crate) fn validate_dir(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() || path == Path::new(".") {
        return Ok(PathBuf::new());
    }
    validate(path)
}
