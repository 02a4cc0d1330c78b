//! Local filesystem tree.
//!
//! Directory listings and stat calls go through `tokio::fs`; archive member
//! access uses the sync `zip` crate inside `spawn_blocking`, since zip
//! central-directory parsing is seek-heavy and has no async story.

use crate::error::{ErrorKind, Result};
use crate::file::{DirEntry, FileRef, Fingerprint};
use crate::path::{validate as validate_path, validate_dir};
use crate::tree::FileTree;
use async_trait::async_trait;
use exn::ResultExt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::fs;

/// A library rooted at a local directory.
#[derive(Clone)]
pub struct LocalTree {
    name: String,
    root: PathBuf,
}

impl LocalTree {
    /// Create a tree rooted at an absolute path. The directory is created if
    /// it does not exist yet.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidPath(root));
            }
        } else {
            // Sync on purpose; happens once at startup and keeps the
            // constructor non-async.
            std::fs::create_dir_all(&root).map_err(|e| map_io_error(e, &root))?;
        }
        Ok(Self { name: name.into(), root })
    }

    fn absolute(&self, path: &Path) -> Result<PathBuf> {
        Ok(self.root.join(validate_path(path)?))
    }

    fn open_archive(path: &Path) -> Result<zip::ZipArchive<std::fs::File>> {
        let file = std::fs::File::open(path).map_err(|e| map_io_error(e, path))?;
        zip::ZipArchive::new(file).or_raise(|| ErrorKind::Archive(path.to_path_buf(), "unreadable container".to_string()))
    }
}

fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
    match e.kind() {
        std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
        std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
        _ => ErrorKind::Io(e),
    }
}

fn fingerprint_of(metadata: &std::fs::Metadata) -> Fingerprint {
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| match t.duration_since(UNIX_EPOCH) {
            Ok(d) => i64::try_from(d.as_secs()).ok(),
            // Pre-epoch mtimes exist on badly-copied media; treat as zero.
            Err(_) => Some(0),
        })
        .unwrap_or(0);
    Fingerprint::new(metadata.len(), mtime)
}

#[async_trait]
impl FileTree for LocalTree {
    fn name(&self) -> &str {
        &self.name
    }

    async fn children(&self, dir: &Path) -> Result<Vec<DirEntry>> {
        let relative = validate_dir(dir)?;
        let absolute = self.root.join(&relative);
        let mut reader = match fs::read_dir(&absolute).await {
            Ok(reader) => reader,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(exn::Exn::from(map_io_error(err, &absolute))),
        };
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await.map_err(|e| map_io_error(e, &absolute))? {
            let file_type = entry.file_type().await.map_err(|e| map_io_error(e, &entry.path()))?;
            if file_type.is_symlink() {
                // Links are where traversal loops come from. Skip them; the
                // catalog's visited-set guard then only has to deduplicate
                // plain paths.
                tracing::debug!(path = %entry.path().display(), "skipping symlink during listing");
                continue;
            }
            entries.push(DirEntry {
                path: relative.join(entry.file_name()),
                is_dir: file_type.is_dir(),
            });
        }
        // read_dir order is filesystem-dependent; sort so repeated scans of
        // an unchanged tree discover files in the same order.
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let absolute = self.absolute(path)?;
        Ok(fs::try_exists(&absolute).await.map_err(ErrorKind::Io)?)
    }

    async fn fingerprint(&self, path: &Path) -> Result<Fingerprint> {
        let absolute = self.absolute(path)?;
        let metadata = fs::metadata(&absolute).await.map_err(|e| map_io_error(e, path))?;
        Ok(fingerprint_of(&metadata))
    }

    async fn read(&self, file: &FileRef) -> Result<Vec<u8>> {
        match file {
            FileRef::Physical(path) => {
                let absolute = self.absolute(path)?;
                Ok(fs::read(&absolute).await.map_err(|e| map_io_error(e, path))?)
            },
            FileRef::ArchiveEntry { archive, entry } => {
                let absolute = self.absolute(archive)?;
                let archive = archive.clone();
                let entry = entry.clone();
                tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
                    let mut container = Self::open_archive(&absolute)?;
                    let mut member = container
                        .by_name(&entry)
                        .or_raise(|| ErrorKind::Archive(archive.clone(), format!("no such member: {entry}")))?;
                    let mut bytes = Vec::with_capacity(member.size() as usize);
                    member.read_to_end(&mut bytes).map_err(|e| map_io_error(e, &archive))?;
                    Ok(bytes)
                })
                .await
                .or_raise(|| ErrorKind::Io(std::io::Error::other("archive read task cancelled")))?
            },
            FileRef::Builtin(name) => exn::bail!(ErrorKind::Virtual(name.clone())),
        }
    }

    async fn archive_entries(&self, archive: &Path) -> Result<Vec<String>> {
        let absolute = self.absolute(archive)?;
        let archive = archive.to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
            let container = Self::open_archive(&absolute)?;
            Ok(container.file_names().filter(|name| !name.ends_with('/')).map(str::to_string).collect())
        })
        .await
        .or_raise(|| ErrorKind::Io(std::io::Error::other("archive list task cancelled")))?
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let absolute = self.absolute(path)?;
        Ok(fs::remove_file(&absolute).await.map_err(|e| map_io_error(e, path))?)
    }
}
