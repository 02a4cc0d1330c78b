//! The reconciliation pass.
//!
//! One pass brings the catalog index, the gateway rows, and the file tree
//! back into agreement:
//!
//! 1. validate previously-catalogued rows (drop stale archive-member rows,
//!    mark rows with vanished files as orphans, re-read changed files,
//!    index the rest as-is);
//! 2. load older orphaned rows as resurrection candidates;
//! 3. walk the tree breadth-first, admitting every readable book that is
//!    not already indexed, descending into multi-book archive containers;
//! 4. admit the bundled help book if nothing else did;
//! 5. flush: persist file-id assignments, then write all new rows in one
//!    atomic batch and flip existing flags both ways.
//!
//! The pass is fallible only at the gateway boundary; anything wrong with an
//! individual file becomes a [`SkipReason`] in the report.

mod report;

pub use self::report::{BuildReport, SkipReason};
use crate::book::Book;
use crate::catalog::Catalog;
use crate::error::{ErrorKind, Result};
use crate::fileset::FileIdentitySet;
use exn::ResultExt;
use folio_db::{BookId, BookRecord, FileId, NewBook};
use folio_meta::BookMeta;
use folio_vfs::FileRef;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

/// Identity of the bundled help book, embedded at compile time.
const HELP_BOOK: &str = "help/intro.fb2";

#[derive(rust_embed::RustEmbed)]
#[folder = "assets/"]
struct Assets;

pub(crate) async fn run(catalog: &Catalog) -> Result<BuildReport> {
    let records = catalog.gateway.load_file_ids().await.or_raise(|| ErrorKind::Gateway)?;
    let mut pass = Pass {
        catalog,
        fileset: FileIdentitySet::seed(records),
        changed: HashMap::new(),
        orphans: HashMap::new(),
        newly_orphaned: Vec::new(),
        revived: Vec::new(),
        created: Vec::new(),
        report: BuildReport::default(),
    };
    pass.validate_rows().await?;
    pass.load_orphan_candidates().await?;
    pass.walk().await?;
    pass.help_book().await?;
    pass.flush().await
}

/// State threaded through the steps of one pass.
struct Pass<'a> {
    catalog: &'a Catalog,
    fileset: FileIdentitySet,
    /// Memoized per-pass answer to "did this physical file change"; without
    /// it, the second member of a changed archive would see the refreshed
    /// fingerprint and be treated as unchanged.
    changed: HashMap<PathBuf, bool>,
    /// Resurrection candidates, by file id.
    orphans: HashMap<FileId, BookRecord>,
    newly_orphaned: Vec<BookId>,
    revived: Vec<BookId>,
    created: Vec<NewBook>,
    report: BuildReport,
}

impl Pass<'_> {
    /// Step 1: check every live row against the tree.
    async fn validate_rows(&mut self) -> Result<()> {
        let rows = self.catalog.gateway.load_books(true).await.or_raise(|| ErrorKind::Gateway)?;
        for mut row in rows {
            if row.file.is_stale_member() {
                self.catalog.gateway.delete_book(row.id).await.or_raise(|| ErrorKind::Gateway)?;
                self.catalog.drop_and_announce(&row.file);
                self.skip(row.file.clone(), SkipReason::StaleArchiveMember);
                continue;
            }
            let Some(path) = row.file.physical_path().map(Path::to_path_buf) else {
                // Builtin resources always exist.
                self.report.indexed += 1;
                self.catalog.index_and_announce(Book::from(row));
                continue;
            };
            if !self.catalog.tree.exists(&path).await.unwrap_or(false) {
                self.orphan(row);
                continue;
            }
            match self.path_changed(&row.file, &path).await {
                Ok(false) => {
                    self.report.indexed += 1;
                    self.catalog.index_and_announce(Book::from(row));
                },
                Ok(true) => match self.catalog.reader.read(&self.catalog.tree, &row.file).await {
                    Ok(meta) => {
                        if meta != row.meta {
                            row.meta = meta;
                            self.catalog.gateway.update_book(&row).await.or_raise(|| ErrorKind::Gateway)?;
                        }
                        self.report.indexed += 1;
                        self.catalog.index_and_announce(Book::from(row));
                    },
                    Err(error) => {
                        // Still on disk, but not a readable book right now:
                        // out of the index this pass, existing flag left
                        // intact so the row surfaces again once the file
                        // parses. Only vanished files get orphaned.
                        self.catalog.drop_and_announce(&row.file);
                        self.skip(row.file.clone(), skip_reason(&error));
                        self.orphans.insert(row.file_id, row);
                    },
                },
                // Could not stat the file; treat it as missing this pass.
                Err(_) => self.orphan(row),
            }
        }
        Ok(())
    }

    /// Step 2: rows orphaned by earlier passes are candidates too.
    async fn load_orphan_candidates(&mut self) -> Result<()> {
        let rows = self.catalog.gateway.load_books(false).await.or_raise(|| ErrorKind::Gateway)?;
        for row in rows {
            self.orphans.insert(row.file_id, row);
        }
        Ok(())
    }

    /// Step 3: breadth-first walk over the whole tree, deterministic because
    /// directory listings come back sorted. The visited set guards against
    /// traversal loops on top of the tree's no-symlink policy.
    async fn walk(&mut self) -> Result<()> {
        let mut queue = VecDeque::from([PathBuf::new()]);
        let mut visited: HashSet<PathBuf> = HashSet::new();
        while let Some(dir) = queue.pop_front() {
            if !visited.insert(dir.clone()) {
                continue;
            }
            let entries = match self.catalog.tree.children(&dir).await {
                Ok(entries) => entries,
                Err(error) => {
                    tracing::warn!(dir = %dir.display(), %error, "skipping unlistable directory");
                    continue;
                },
            };
            for entry in entries {
                if entry.is_dir {
                    queue.push_back(entry.path);
                } else {
                    self.visit_file(entry.path).await?;
                }
            }
        }
        Ok(())
    }

    async fn visit_file(&mut self, path: PathBuf) -> Result<()> {
        let file = FileRef::Physical(path.clone());
        if self.catalog.contains(&file) {
            return Ok(());
        }
        // Record the fingerprint while we are here; failures surface again
        // from the read below.
        _ = self.path_changed(&file, &path).await;
        match self.catalog.reader.read(&self.catalog.tree, &file).await {
            Ok(meta) => self.admit(file, meta).await,
            Err(error) if folio_vfs::is_container(&path) => {
                tracing::trace!(file = %file, %error, "descending into archive container");
                self.visit_archive(path).await
            },
            Err(error) => {
                self.skip(file, skip_reason(&error));
                Ok(())
            },
        }
    }

    async fn visit_archive(&mut self, archive: PathBuf) -> Result<()> {
        let entries = match self.catalog.tree.archive_entries(&archive).await {
            Ok(entries) => entries,
            Err(error) => {
                tracing::warn!(archive = %archive.display(), %error, "unreadable archive container");
                self.skip(FileRef::Physical(archive), SkipReason::Inaccessible);
                return Ok(());
            },
        };
        for entry in entries {
            let member = FileRef::ArchiveEntry { archive: archive.clone(), entry };
            if self.catalog.contains(&member) {
                continue;
            }
            match self.catalog.reader.read(&self.catalog.tree, &member).await {
                Ok(meta) => self.admit(member, meta).await?,
                Err(error) => self.skip(member, skip_reason(&error)),
            }
        }
        Ok(())
    }

    /// Step 4: the bundled help book, unless a row for it already exists.
    async fn help_book(&mut self) -> Result<()> {
        let help = FileRef::Builtin(HELP_BOOK.to_string());
        if self.catalog.contains(&help) {
            return Ok(());
        }
        let Some(asset) = Assets::get(HELP_BOOK) else {
            tracing::warn!("help book asset missing from the binary");
            return Ok(());
        };
        match folio_meta::extract(help.name(), &asset.data) {
            Ok(meta) => self.admit(help, meta).await,
            Err(error) => {
                tracing::warn!(%error, "bundled help book does not parse");
                Ok(())
            },
        }
    }

    /// A readable book was found: revive the orphaned row carrying the same
    /// file identity, or queue a fresh row for the flush.
    async fn admit(&mut self, file: FileRef, meta: BookMeta) -> Result<()> {
        let file_id = self.fileset.id(&file);
        match self.orphans.remove(&file_id) {
            Some(mut row) => {
                if row.meta != meta {
                    row.meta = meta;
                    self.catalog.gateway.update_book(&row).await.or_raise(|| ErrorKind::Gateway)?;
                }
                row.existing = true;
                self.revived.push(row.id);
                self.report.resurrected += 1;
                self.catalog.index_and_announce(Book::from(row));
            },
            None => self.created.push(NewBook { file_id, file, meta }),
        }
        Ok(())
    }

    /// Step 5: make it all durable. File ids go first so the new rows
    /// reference persisted identities; the new rows themselves are one
    /// atomic batch.
    async fn flush(mut self) -> Result<BuildReport> {
        let gateway = &self.catalog.gateway;
        self.fileset.persist(gateway).await?;
        let created_rows = gateway.insert_books(&self.created).await.or_raise(|| ErrorKind::Gateway)?;
        if !self.revived.is_empty() {
            gateway.set_existing(&self.revived, true).await.or_raise(|| ErrorKind::Gateway)?;
        }
        if !self.newly_orphaned.is_empty() {
            gateway.set_existing(&self.newly_orphaned, false).await.or_raise(|| ErrorKind::Gateway)?;
        }
        self.report.created = created_rows.len();
        self.report.orphaned = self.newly_orphaned.len();
        for row in created_rows {
            self.catalog.index_and_announce(Book::from(row));
        }
        Ok(self.report)
    }

    /// Mark a live row as orphaned: out of the index now, flag flipped at
    /// flush, resurrection candidate for the rest of the pass.
    fn orphan(&mut self, mut row: BookRecord) {
        self.catalog.drop_and_announce(&row.file);
        self.newly_orphaned.push(row.id);
        row.existing = false;
        self.orphans.insert(row.file_id, row);
    }

    /// The walk revisits files already dropped during row validation; each
    /// file is reported once.
    fn skip(&mut self, file: FileRef, reason: SkipReason) {
        if self.report.skipped.iter().any(|(skipped, _)| *skipped == file) {
            return;
        }
        tracing::debug!(file = %file, %reason, "skipping");
        self.report.skipped.push((file, reason));
    }

    async fn path_changed(&mut self, file: &FileRef, path: &Path) -> Result<bool> {
        if let Some(&answer) = self.changed.get(path) {
            return Ok(answer);
        }
        let current = self.catalog.tree.fingerprint(path).await.or_raise(|| ErrorKind::Tree)?;
        let answer = self.fileset.changed(file, current);
        self.changed.insert(path.to_path_buf(), answer);
        Ok(answer)
    }
}

fn skip_reason(error: &folio_meta::error::Error) -> SkipReason {
    match &**error {
        folio_meta::error::ErrorKind::Unsupported(_) => SkipReason::UnsupportedFormat,
        folio_meta::error::ErrorKind::Unreadable(_) => SkipReason::UnreadableContent,
        folio_meta::error::ErrorKind::Storage => SkipReason::Inaccessible,
    }
}
