//! The collection store.
//!
//! [`Catalog`] owns the live book index and coordinates everything around
//! it: lazy hydration by id, explicit add/remove, favorites, the bounded
//! recency list, bookmark pass-through, and the reconciliation pass
//! (`build_once` inline, `start_build` on a worker task).
//!
//! One mutex guards both index maps together, and it is never held across
//! an `.await` or while an event is emitted.

use crate::book::Book;
use crate::build::{self, BuildReport};
use crate::error::{ErrorKind, Result};
use crate::events::{BookEventKind, BuildEventKind, CatalogEvent, EventBus};
use crate::fileset::FileIdentitySet;
use exn::{OptionExt, ResultExt};
use folio_db::{BookId, Bookmark, GatewayHandle, NewBook};
use folio_meta::ReaderHandle;
use folio_vfs::{FileRef, TreeHandle};
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedReceiver;

/// Upper bound on the recency list.
pub const RECENT_LIST_CAP: usize = 12;

/// In-memory index: one entry per live book, discoverable by file reference
/// or by row id, in discovery order.
#[derive(Debug, Default)]
struct Index {
    by_file: HashMap<FileRef, Book>,
    by_id: HashMap<BookId, FileRef>,
    order: Vec<FileRef>,
}

pub struct Catalog {
    pub(crate) gateway: GatewayHandle,
    pub(crate) tree: TreeHandle,
    pub(crate) reader: ReaderHandle,
    pub(crate) events: EventBus,
    index: Mutex<Index>,
    building: AtomicBool,
}

impl Catalog {
    /// An empty catalog over the given collaborators. Call
    /// [`build_once`](Self::build_once) or [`start_build`](Self::start_build)
    /// to populate it from the tree.
    pub fn new(gateway: GatewayHandle, tree: TreeHandle, reader: ReaderHandle) -> Self {
        Self {
            gateway,
            tree,
            reader,
            events: EventBus::new(),
            index: Mutex::new(Index::default()),
            building: AtomicBool::new(false),
        }
    }

    /// Listen for book and build events.
    pub fn subscribe(&self) -> UnboundedReceiver<CatalogEvent> {
        self.events.subscribe()
    }

    pub fn len(&self) -> usize {
        self.lock().by_file.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().by_file.is_empty()
    }

    /// Snapshot of all live books, in discovery order.
    pub fn books(&self) -> Vec<Book> {
        let index = self.lock();
        index.order.iter().filter_map(|file| index.by_file.get(file)).cloned().collect()
    }

    /// The live book backed by this file reference, if indexed.
    pub fn book_by_file(&self, file: &FileRef) -> Option<Book> {
        self.lock().by_file.get(file).cloned()
    }

    /// Fetch a book by row id, hydrating from the gateway on an index miss.
    ///
    /// A hydrated book is only admitted if its backing file still exists;
    /// when the file changed since last seen, metadata is re-read first and
    /// a file that stopped being a readable book yields `None`.
    pub async fn book_by_id(&self, id: BookId) -> Result<Option<Book>> {
        if let Some(book) = self.cached_by_id(id) {
            return Ok(Some(book));
        }
        let Some(mut record) = self.gateway.load_book(id).await.or_raise(|| ErrorKind::Gateway)? else {
            return Ok(None);
        };
        let Some(path) = record.file.physical_path().map(Path::to_path_buf) else {
            // Builtin resources always exist.
            let book = Book::from(record);
            self.index_and_announce(book.clone());
            return Ok(Some(book));
        };
        if !self.tree.exists(&path).await.or_raise(|| ErrorKind::Tree)? {
            return Ok(None);
        }
        let current = self.tree.fingerprint(&path).await.or_raise(|| ErrorKind::Tree)?;
        let mut fileset = self.load_fileset().await?;
        if fileset.changed(&record.file, current) {
            let Ok(meta) = self.reader.read(&self.tree, &record.file).await else {
                // Still on disk, but no longer a readable book.
                return Ok(None);
            };
            if meta != record.meta {
                record.meta = meta;
                self.gateway.update_book(&record).await.or_raise(|| ErrorKind::Gateway)?;
            }
            fileset.persist(&self.gateway).await?;
        }
        let book = Book::from(record);
        self.index_and_announce(book.clone());
        Ok(Some(book))
    }

    /// Admit a single file into the catalog, persisting it immediately.
    ///
    /// Idempotent: adding an already-indexed file returns the live book
    /// without re-reading or emitting anything, and concurrent adds of the
    /// same file converge on a single row. A previously-orphaned row with
    /// the same file identity is revived, keeping its id.
    pub async fn add(&self, file: FileRef) -> Result<Book> {
        if let Some(book) = self.book_by_file(&file) {
            return Ok(book);
        }
        let meta = self.reader.read(&self.tree, &file).await.or_raise(|| ErrorKind::Metadata)?;
        let mut fileset = self.load_fileset().await?;
        if let Some(path) = file.physical_path() {
            let current = self.tree.fingerprint(path).await.or_raise(|| ErrorKind::Tree)?;
            fileset.changed(&file, current);
        }
        let file_id = fileset.id(&file);
        fileset.persist(&self.gateway).await?;

        let orphans = self.gateway.load_books(false).await.or_raise(|| ErrorKind::Gateway)?;
        let book = match orphans.into_iter().find(|row| row.file_id == file_id) {
            Some(mut row) => {
                self.gateway.set_existing(&[row.id], true).await.or_raise(|| ErrorKind::Gateway)?;
                if row.meta != meta {
                    row.meta = meta;
                    self.gateway.update_book(&row).await.or_raise(|| ErrorKind::Gateway)?;
                }
                row.existing = true;
                Book::from(row)
            },
            None => {
                let new_book = NewBook { file_id, file, meta };
                match self.gateway.insert_books(std::slice::from_ref(&new_book)).await {
                    Ok(created) => Book::from(created.into_iter().next().ok_or_raise(|| ErrorKind::Gateway)?),
                    Err(error) => {
                        // A concurrent add of the same file may have won the
                        // insert; adopt its row instead of surfacing the
                        // identity-conflict error.
                        let rows = self.gateway.load_books(true).await.or_raise(|| ErrorKind::Gateway)?;
                        match rows.into_iter().find(|row| row.file_id == file_id) {
                            Some(row) => Book::from(row),
                            None => return Err(error).or_raise(|| ErrorKind::Gateway),
                        }
                    },
                }
            },
        };
        self.index_and_announce(book.clone());
        Ok(book)
    }

    /// Drop a book from the catalog and delete its row, cascading favorites
    /// and bookmarks and stripping it from the recency list.
    ///
    /// With `delete_file` set, a plain physical backing file is also deleted
    /// from disk and `true` is returned. Archive members and builtin
    /// resources are never deleted (other books may share the archive), so
    /// those removals return `false`.
    pub async fn remove(&self, book: &Book, delete_file: bool) -> Result<bool> {
        if let Some(id) = book.id {
            let recent = self.gateway.load_recent_ids().await.or_raise(|| ErrorKind::Gateway)?;
            if recent.contains(&id) {
                let kept: Vec<BookId> = recent.into_iter().filter(|recent_id| *recent_id != id).collect();
                self.gateway.save_recent_ids(&kept).await.or_raise(|| ErrorKind::Gateway)?;
            }
            self.gateway.delete_book(id).await.or_raise(|| ErrorKind::Gateway)?;
        }
        let mut file_deleted = false;
        if delete_file && let FileRef::Physical(path) = &book.file {
            self.tree.delete(path).await.or_raise(|| ErrorKind::Tree)?;
            file_deleted = true;
        }
        if let Some(dropped) = self.drop_indexed(&book.file) {
            self.events.emit_book(BookEventKind::Removed, dropped);
        }
        Ok(file_deleted)
    }

    /// Flip the persisted favorite flag and announce the book as updated.
    pub async fn set_favorite(&self, book: &Book, favorite: bool) -> Result<()> {
        let Some(id) = book.id else { return Ok(()) };
        match favorite {
            true => self.gateway.add_favorite(id).await,
            false => self.gateway.remove_favorite(id).await,
        }
        .or_raise(|| ErrorKind::Gateway)?;
        self.events.emit_book(BookEventKind::Updated, book.clone());
        Ok(())
    }

    pub async fn favorite_books(&self) -> Result<Vec<Book>> {
        let ids = self.gateway.load_favorite_ids().await.or_raise(|| ErrorKind::Gateway)?;
        self.books_by_ids(ids).await
    }

    /// Move a book to the front of the recency list, deduplicating and
    /// keeping at most [`RECENT_LIST_CAP`] entries. Persisted immediately.
    pub async fn touch_recent(&self, book: &Book) -> Result<()> {
        let Some(id) = book.id else { return Ok(()) };
        let mut ids = self.gateway.load_recent_ids().await.or_raise(|| ErrorKind::Gateway)?;
        ids.retain(|recent_id| *recent_id != id);
        ids.insert(0, id);
        ids.truncate(RECENT_LIST_CAP);
        self.gateway.save_recent_ids(&ids).await.or_raise(|| ErrorKind::Gateway)
    }

    /// Recently-opened books, most recent first. Entries whose backing file
    /// vanished are silently skipped.
    pub async fn recent_books(&self) -> Result<Vec<Book>> {
        let ids = self.gateway.load_recent_ids().await.or_raise(|| ErrorKind::Gateway)?;
        self.books_by_ids(ids).await
    }

    /// The `index`-th most recently opened book (0 = most recent).
    pub async fn recent_book(&self, index: usize) -> Result<Option<Book>> {
        let ids = self.gateway.load_recent_ids().await.or_raise(|| ErrorKind::Gateway)?;
        match ids.get(index) {
            Some(&id) => self.book_by_id(id).await,
            None => Ok(None),
        }
    }

    /// Bookmarks for one book, oldest first.
    pub async fn bookmarks(&self, book: &Book, visible_only: bool) -> Result<Vec<Bookmark>> {
        let Some(id) = book.id else { return Ok(Vec::new()) };
        self.gateway.load_bookmarks(id, visible_only).await.or_raise(|| ErrorKind::Gateway)
    }

    pub async fn all_visible_bookmarks(&self) -> Result<Vec<Bookmark>> {
        self.gateway.load_all_visible_bookmarks().await.or_raise(|| ErrorKind::Gateway)
    }

    /// Persist a bookmark, returning it with its assigned id.
    pub async fn save_bookmark(&self, mut bookmark: Bookmark) -> Result<Bookmark> {
        let id = self.gateway.save_bookmark(&bookmark).await.or_raise(|| ErrorKind::Gateway)?;
        bookmark.id = Some(id);
        Ok(bookmark)
    }

    /// Delete a saved bookmark. Unsaved bookmarks are a no-op.
    pub async fn delete_bookmark(&self, bookmark: &Bookmark) -> Result<()> {
        match bookmark.id {
            Some(id) => self.gateway.delete_bookmark(id).await.or_raise(|| ErrorKind::Gateway),
            None => Ok(()),
        }
    }

    /// Request a reconciliation pass on a background task.
    ///
    /// Fire-and-forget: the outcome is reported through the event bus. At
    /// most one pass runs at a time; a rejected request emits
    /// [`NotStarted`](BuildEventKind::NotStarted) synchronously and returns
    /// `false`.
    pub fn start_build(self: &Arc<Self>) -> bool {
        if !self.try_acquire_build() {
            self.events.emit_build(BuildEventKind::NotStarted);
            return false;
        }
        let catalog = Arc::clone(self);
        tokio::spawn(async move {
            _ = catalog.run_guarded().await;
        });
        true
    }

    /// Run a reconciliation pass inline and return its report. Emits the
    /// same event sequence as [`start_build`](Self::start_build).
    pub async fn build_once(&self) -> Result<BuildReport> {
        if !self.try_acquire_build() {
            self.events.emit_build(BuildEventKind::NotStarted);
            exn::bail!(ErrorKind::AlreadyBuilding);
        }
        self.run_guarded().await
    }

    fn try_acquire_build(&self) -> bool {
        self.building.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok()
    }

    /// Runs the pass between `Started` and a guaranteed `Completed`,
    /// clearing the in-progress flag even if the pass panics.
    async fn run_guarded(&self) -> Result<BuildReport> {
        self.events.emit_build(BuildEventKind::Started);
        let outcome = AssertUnwindSafe(build::run(self)).catch_unwind().await;
        let result = match outcome {
            Ok(Ok(report)) => {
                tracing::info!(
                    indexed = report.indexed,
                    created = report.created,
                    resurrected = report.resurrected,
                    orphaned = report.orphaned,
                    skipped = report.skipped.len(),
                    "reconciliation pass finished",
                );
                self.events.emit_build(BuildEventKind::Succeeded);
                Ok(report)
            },
            Ok(Err(error)) => {
                tracing::error!(%error, "reconciliation pass failed");
                self.events.emit_build(BuildEventKind::Failed);
                Err(error)
            },
            Err(_panic) => {
                tracing::error!("reconciliation pass panicked");
                self.events.emit_build(BuildEventKind::Failed);
                Err(exn::Exn::from(ErrorKind::Panicked))
            },
        };
        self.events.emit_build(BuildEventKind::Completed);
        self.building.store(false, Ordering::Release);
        result
    }

    async fn load_fileset(&self) -> Result<FileIdentitySet> {
        let records = self.gateway.load_file_ids().await.or_raise(|| ErrorKind::Gateway)?;
        Ok(FileIdentitySet::seed(records))
    }

    async fn books_by_ids(&self, ids: Vec<BookId>) -> Result<Vec<Book>> {
        let mut books = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(book) = self.book_by_id(id).await? {
                books.push(book);
            }
        }
        Ok(books)
    }

    /// Insert or refresh an index entry and announce the change. Indexing an
    /// identical book is silent.
    pub(crate) fn index_and_announce(&self, book: Book) {
        if let Some((kind, book)) = self.index_book(book) {
            self.events.emit_book(kind, book);
        }
    }

    /// Drop an index entry and announce the removal, if it was present.
    pub(crate) fn drop_and_announce(&self, file: &FileRef) {
        if let Some(dropped) = self.drop_indexed(file) {
            self.events.emit_book(BookEventKind::Removed, dropped);
        }
    }

    pub(crate) fn contains(&self, file: &FileRef) -> bool {
        self.lock().by_file.contains_key(file)
    }

    fn cached_by_id(&self, id: BookId) -> Option<Book> {
        let index = self.lock();
        index.by_id.get(&id).and_then(|file| index.by_file.get(file)).cloned()
    }

    fn index_book(&self, book: Book) -> Option<(BookEventKind, Book)> {
        let mut index = self.lock();
        let kind = match index.by_file.get(&book.file) {
            Some(current) if *current == book => return None,
            Some(_) => BookEventKind::Updated,
            None => {
                index.order.push(book.file.clone());
                BookEventKind::Added
            },
        };
        if let Some(id) = book.id {
            index.by_id.insert(id, book.file.clone());
        }
        index.by_file.insert(book.file.clone(), book.clone());
        Some((kind, book))
    }

    fn drop_indexed(&self, file: &FileRef) -> Option<Book> {
        let mut index = self.lock();
        let book = index.by_file.remove(file)?;
        index.order.retain(|entry| entry != file);
        if let Some(id) = book.id {
            index.by_id.remove(&id);
        }
        Some(book)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Index> {
        self.index.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
