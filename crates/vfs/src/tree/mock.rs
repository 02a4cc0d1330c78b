//! In-memory file tree for testing.
//!
//! Files live in a map behind a mutex, so every trait method works on
//! `&self`, and tests can mutate the tree between reconciliation passes
//! (add, remove, touch) without a real filesystem. Archive containers are
//! registered explicitly with their member list instead of being parsed
//! from real zip bytes.

use crate::error::{ErrorKind, Result};
use crate::file::{DirEntry, FileRef, Fingerprint};
use crate::path::{validate as validate_path, validate_dir};
use crate::tree::FileTree;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

struct Stored {
    bytes: Vec<u8>,
    mtime: i64,
}

struct Inner {
    files: BTreeMap<PathBuf, Stored>,
    archives: BTreeMap<PathBuf, Vec<(String, Vec<u8>)>>,
    // Monotonic fake clock; every mutation gets a fresh "mtime".
    clock: i64,
}

/// In-memory [`FileTree`] for tests.
///
/// Path validation mirrors [`LocalTree`](crate::tree::LocalTree); setup
/// methods panic on invalid paths because broken test fixtures should not
/// produce passing tests.
pub struct MockTree {
    name: String,
    inner: Mutex<Inner>,
}

impl MockTree {
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            inner: Mutex::new(Inner {
                files: BTreeMap::new(),
                archives: BTreeMap::new(),
                clock: 1_000,
            }),
        }
    }

    /// Create a tree pre-populated with plain files.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let tree = Self::new();
        for (path, bytes) in files {
            tree.add_file(path, bytes);
        }
        tree
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn checked(path: impl Into<PathBuf>) -> PathBuf {
        let path = path.into();
        match validate_path(&path) {
            Ok(valid) => valid,
            Err(_) => panic!("MockTree: invalid path {}", path.display()),
        }
    }

    /// Add or overwrite a plain file, advancing its mtime.
    pub fn add_file(&self, path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) {
        let path = Self::checked(path);
        let mut inner = self.inner.lock().unwrap();
        inner.clock += 1;
        let mtime = inner.clock;
        inner.files.insert(path, Stored { bytes: bytes.into(), mtime });
    }

    /// Register an archive container and its members. The container also
    /// appears as a plain file so listings and fingerprints see it.
    pub fn add_archive(
        &self,
        path: impl Into<PathBuf>,
        members: impl IntoIterator<Item = (impl Into<String>, impl Into<Vec<u8>>)>,
    ) {
        let path = Self::checked(path);
        let members: Vec<(String, Vec<u8>)> =
            members.into_iter().map(|(name, bytes)| (name.into(), bytes.into())).collect();
        // Synthetic container bytes: size varies with content so replacing
        // members changes the fingerprint, exactly like a rewritten zip.
        let bytes: Vec<u8> = members.iter().flat_map(|(_, data)| data.iter().copied()).collect();
        self.add_file(&path, bytes);
        self.inner.lock().unwrap().archives.insert(path, members);
    }

    /// Bump a file's mtime without changing content (simulates `touch`).
    pub fn touch(&self, path: impl AsRef<Path>) {
        let path = Self::checked(path.as_ref());
        let mut inner = self.inner.lock().unwrap();
        inner.clock += 1;
        let mtime = inner.clock;
        if let Some(stored) = inner.files.get_mut(&path) {
            stored.mtime = mtime;
        }
    }

    /// Remove a file (and its archive registration, if any).
    pub fn remove_file(&self, path: impl AsRef<Path>) {
        let path = Self::checked(path.as_ref());
        let mut inner = self.inner.lock().unwrap();
        inner.files.remove(&path);
        inner.archives.remove(&path);
    }
}

impl Default for MockTree {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileTree for MockTree {
    fn name(&self) -> &str {
        &self.name
    }

    async fn children(&self, dir: &Path) -> Result<Vec<DirEntry>> {
        let dir = validate_dir(dir)?;
        let inner = self.inner.lock().unwrap();
        let mut files = Vec::new();
        let mut dirs = BTreeSet::new();
        for path in inner.files.keys() {
            let Ok(rest) = path.strip_prefix(&dir) else { continue };
            let mut components = rest.components();
            let Some(first) = components.next() else { continue };
            if components.next().is_none() {
                files.push(DirEntry { path: path.clone(), is_dir: false });
            } else {
                dirs.insert(dir.join(first));
            }
        }
        let mut entries: Vec<DirEntry> =
            dirs.into_iter().map(|path| DirEntry { path, is_dir: true }).collect();
        entries.extend(files);
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let path = validate_path(path)?;
        Ok(self.inner.lock().unwrap().files.contains_key(&path))
    }

    async fn fingerprint(&self, path: &Path) -> Result<Fingerprint> {
        let path = validate_path(path)?;
        let inner = self.inner.lock().unwrap();
        let stored = inner.files.get(&path).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path.clone())))?;
        Ok(Fingerprint::new(stored.bytes.len() as u64, stored.mtime))
    }

    async fn read(&self, file: &FileRef) -> Result<Vec<u8>> {
        match file {
            FileRef::Physical(path) => {
                let path = validate_path(path)?;
                let inner = self.inner.lock().unwrap();
                let stored =
                    inner.files.get(&path).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path.clone())))?;
                Ok(stored.bytes.clone())
            },
            FileRef::ArchiveEntry { archive, entry } => {
                let path = validate_path(archive)?;
                let inner = self.inner.lock().unwrap();
                let members = inner
                    .archives
                    .get(&path)
                    .ok_or_else(|| exn::Exn::from(ErrorKind::Archive(path.clone(), "not an archive".to_string())))?;
                members
                    .iter()
                    .find(|(name, _)| name == entry)
                    .map(|(_, bytes)| bytes.clone())
                    .ok_or_else(|| exn::Exn::from(ErrorKind::Archive(path.clone(), format!("no such member: {entry}"))))
            },
            FileRef::Builtin(name) => exn::bail!(ErrorKind::Virtual(name.clone())),
        }
    }

    async fn archive_entries(&self, archive: &Path) -> Result<Vec<String>> {
        let path = validate_path(archive)?;
        let inner = self.inner.lock().unwrap();
        let members = inner
            .archives
            .get(&path)
            .ok_or_else(|| exn::Exn::from(ErrorKind::Archive(path.clone(), "not an archive".to_string())))?;
        Ok(members.iter().map(|(name, _)| name.clone()).collect())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let path = validate_path(path)?;
        let mut inner = self.inner.lock().unwrap();
        inner.archives.remove(&path);
        inner.files.remove(&path).map(|_| ()).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))
    }
}
