//! In-memory [`Gateway`] for tests.

use crate::error::{ErrorKind, Result};
use crate::gateway::Gateway;
use crate::models::{BookId, BookRecord, Bookmark, FileIdRecord, NewBook};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

/// A gateway that keeps everything in maps behind a mutex.
///
/// Faster than spinning up an in-memory SQLite pool for every test, and it
/// can inject write failures so callers can exercise their error paths.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    books: BTreeMap<BookId, BookRecord>,
    file_ids: BTreeMap<i64, FileIdRecord>,
    recent: Vec<BookId>,
    favorites: BTreeSet<BookId>,
    bookmarks: BTreeMap<i64, Bookmark>,
    next_book_id: BookId,
    next_bookmark_id: i64,
    fail_writes: bool,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write operation fail with a database error.
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Snapshot of every book row, existing or not.
    pub fn all_books(&self) -> Vec<BookRecord> {
        self.lock().books.values().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn check_writable(inner: &Inner) -> Result<()> {
        if inner.fail_writes {
            exn::bail!(ErrorKind::Database);
        }
        Ok(())
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn load_books(&self, existing: bool) -> Result<Vec<BookRecord>> {
        Ok(self.lock().books.values().filter(|b| b.existing == existing).cloned().collect())
    }

    async fn load_book(&self, id: BookId) -> Result<Option<BookRecord>> {
        Ok(self.lock().books.get(&id).cloned())
    }

    async fn load_file_ids(&self) -> Result<Vec<FileIdRecord>> {
        Ok(self.lock().file_ids.values().cloned().collect())
    }

    async fn save_file_ids(&self, records: &[FileIdRecord]) -> Result<()> {
        let mut inner = self.lock();
        Self::check_writable(&inner)?;
        for record in records {
            inner.file_ids.insert(record.file_id, record.clone());
        }
        Ok(())
    }

    async fn insert_books(&self, books: &[NewBook]) -> Result<Vec<BookRecord>> {
        let mut inner = self.lock();
        Self::check_writable(&inner)?;
        // Same uniqueness rule as the SQLite schema, with the same batch
        // atomicity: one row per file identity, all inserts or none.
        for book in books {
            if inner.books.values().any(|row| row.file_id == book.file_id) {
                exn::bail!(ErrorKind::Database);
            }
        }
        let mut created = Vec::with_capacity(books.len());
        for book in books {
            inner.next_book_id += 1;
            let record = BookRecord {
                id: inner.next_book_id,
                file_id: book.file_id,
                file: book.file.clone(),
                meta: book.meta.clone(),
                existing: true,
            };
            inner.books.insert(record.id, record.clone());
            created.push(record);
        }
        Ok(created)
    }

    async fn update_book(&self, book: &BookRecord) -> Result<()> {
        let mut inner = self.lock();
        Self::check_writable(&inner)?;
        if let Some(row) = inner.books.get_mut(&book.id) {
            row.meta = book.meta.clone();
        }
        Ok(())
    }

    async fn delete_book(&self, id: BookId) -> Result<()> {
        let mut inner = self.lock();
        Self::check_writable(&inner)?;
        inner.books.remove(&id);
        inner.favorites.remove(&id);
        inner.bookmarks.retain(|_, bm| bm.book_id != id);
        Ok(())
    }

    async fn set_existing(&self, ids: &[BookId], existing: bool) -> Result<()> {
        let mut inner = self.lock();
        Self::check_writable(&inner)?;
        for id in ids {
            if let Some(row) = inner.books.get_mut(id) {
                row.existing = existing;
            }
        }
        Ok(())
    }

    async fn load_recent_ids(&self) -> Result<Vec<BookId>> {
        Ok(self.lock().recent.clone())
    }

    async fn save_recent_ids(&self, ids: &[BookId]) -> Result<()> {
        let mut inner = self.lock();
        Self::check_writable(&inner)?;
        inner.recent = ids.to_vec();
        Ok(())
    }

    async fn load_favorite_ids(&self) -> Result<Vec<BookId>> {
        Ok(self.lock().favorites.iter().copied().collect())
    }

    async fn add_favorite(&self, id: BookId) -> Result<()> {
        let mut inner = self.lock();
        Self::check_writable(&inner)?;
        inner.favorites.insert(id);
        Ok(())
    }

    async fn remove_favorite(&self, id: BookId) -> Result<()> {
        let mut inner = self.lock();
        Self::check_writable(&inner)?;
        inner.favorites.remove(&id);
        Ok(())
    }

    async fn load_bookmarks(&self, book_id: BookId, visible_only: bool) -> Result<Vec<Bookmark>> {
        Ok(self
            .lock()
            .bookmarks
            .values()
            .filter(|bm| bm.book_id == book_id && (bm.visible || !visible_only))
            .cloned()
            .collect())
    }

    async fn load_all_visible_bookmarks(&self) -> Result<Vec<Bookmark>> {
        Ok(self.lock().bookmarks.values().filter(|bm| bm.visible).cloned().collect())
    }

    async fn save_bookmark(&self, bookmark: &Bookmark) -> Result<i64> {
        let mut inner = self.lock();
        Self::check_writable(&inner)?;
        let id = match bookmark.id {
            Some(id) => id,
            None => {
                inner.next_bookmark_id += 1;
                inner.next_bookmark_id
            },
        };
        let mut stored = bookmark.clone();
        stored.id = Some(id);
        inner.bookmarks.insert(id, stored);
        Ok(id)
    }

    async fn delete_bookmark(&self, id: i64) -> Result<()> {
        let mut inner = self.lock();
        Self::check_writable(&inner)?;
        inner.bookmarks.remove(&id);
        Ok(())
    }
}
