//! File references and change fingerprints.
//!
//! A [`FileRef`] is the identity a book carries around: stable across scans,
//! hashable, and usable as a map key. A [`Fingerprint`] is the cheap
//! size+mtime signature used to decide "has this file changed since last
//! seen" without re-parsing content.

use std::fmt;
use std::path::{Path, PathBuf};

/// Extensions treated as multi-book archive containers worth descending into.
const CONTAINER_EXTENSIONS: [&str; 2] = ["zip", "cbz"];
/// Extensions that are *technically* archives but hold exactly one logical
/// book; persisted rows pointing inside them are stale.
const SINGLE_BOOK_CONTAINERS: [&str; 1] = ["epub"];

/// Something a book is stored in.
///
/// All paths are relative to the library root of whichever
/// [`FileTree`](crate::FileTree) they came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileRef {
    /// A plain file on disk.
    Physical(PathBuf),
    /// A named entry inside an archive container on disk.
    ArchiveEntry {
        /// Path of the enclosing archive file.
        archive: PathBuf,
        /// Member name within the archive, as stored in its directory.
        entry: String,
    },
    /// A resource bundled with the application (e.g. the help book).
    /// Has no physical backing and always "exists".
    Builtin(String),
}

impl FileRef {
    /// The actual on-disk file behind this reference: the file itself, or the
    /// enclosing archive for members. `None` for builtin resources.
    pub fn physical_path(&self) -> Option<&Path> {
        match self {
            Self::Physical(path) => Some(path),
            Self::ArchiveEntry { archive, .. } => Some(archive),
            Self::Builtin(_) => None,
        }
    }

    /// The leaf name used for format detection (`entry` name for archive
    /// members, file name otherwise).
    pub fn name(&self) -> &str {
        match self {
            Self::Physical(path) => path.file_name().and_then(|n| n.to_str()).unwrap_or_default(),
            Self::ArchiveEntry { entry, .. } => entry.rsplit('/').next().unwrap_or(entry),
            Self::Builtin(name) => name.rsplit('/').next().unwrap_or(name),
        }
    }

    pub fn is_archive_member(&self) -> bool {
        matches!(self, Self::ArchiveEntry { .. })
    }

    /// A persisted archive-member row whose enclosing file is a single-book
    /// container (e.g. `.epub`) is a leftover from an older layout and must
    /// be dropped during reconciliation rather than resurrected.
    pub fn is_stale_member(&self) -> bool {
        match self {
            Self::ArchiveEntry { archive, .. } => is_single_book_container(archive),
            _ => false,
        }
    }
}

impl fmt::Display for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Physical(path) => write!(f, "{}", path.display()),
            Self::ArchiveEntry { archive, entry } => write!(f, "{}:{entry}", archive.display()),
            Self::Builtin(name) => write!(f, "builtin:{name}"),
        }
    }
}

/// Whether reconciliation should descend into this file looking for books.
pub fn is_container(path: impl AsRef<Path>) -> bool {
    has_extension(path.as_ref(), &CONTAINER_EXTENSIONS)
}

/// Whether this archive holds exactly one logical book (so member rows
/// pointing inside it are never valid).
pub fn is_single_book_container(path: impl AsRef<Path>) -> bool {
    has_extension(path.as_ref(), &SINGLE_BOOK_CONTAINERS)
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}

/// A directory listing entry returned by [`FileTree::children`](crate::FileTree::children).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Path relative to the library root.
    pub path: PathBuf,
    pub is_dir: bool,
}

/// Cheap, non-cryptographic change signature for a physical file.
///
/// Size plus modification time, truncated to whole seconds so a fingerprint
/// survives a round-trip through the persisted id table. Archive members do
/// not get their own fingerprint; they inherit the enclosing archive's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    /// File size in bytes.
    pub size: u64,
    /// Modification time as a Unix timestamp in seconds.
    pub mtime: i64,
}

impl Fingerprint {
    pub fn new(size: u64, mtime: i64) -> Self {
        Self { size, mtime }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}b@{}", self.size, self.mtime)
    }
}
