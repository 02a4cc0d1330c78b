//! The persistence gateway contract.

use crate::error::Result;
use crate::models::{BookId, BookRecord, Bookmark, FileIdRecord, NewBook};
use async_trait::async_trait;
use std::sync::Arc;

pub type GatewayHandle = Arc<dyn Gateway>;

/// Everything the catalog persists, as one injectable contract.
///
/// Constructed explicitly and passed in at catalog creation; there is no
/// ambient database singleton anywhere in this workspace.
///
/// # Atomicity
/// [`insert_books`](Self::insert_books) is the flush step of a
/// reconciliation pass and must execute as a single transaction: either
/// every new book gets a row and an id, or none do. Everything else is a
/// single-row (or single-list) operation.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Load all book rows with the given existing-flag value.
    async fn load_books(&self, existing: bool) -> Result<Vec<BookRecord>>;

    /// Load one book row by id.
    async fn load_book(&self, id: BookId) -> Result<Option<BookRecord>>;

    /// All persisted file-identity assignments, for seeding a fresh
    /// identity cache.
    async fn load_file_ids(&self) -> Result<Vec<FileIdRecord>>;

    /// Upsert file-identity assignments. Called before
    /// [`insert_books`](Self::insert_books) so the ids new rows reference
    /// are durable first.
    async fn save_file_ids(&self, records: &[FileIdRecord]) -> Result<()>;

    /// Atomically insert freshly-discovered books; returns the created rows
    /// (with assigned ids) in input order.
    async fn insert_books(&self, books: &[NewBook]) -> Result<Vec<BookRecord>>;

    /// Rewrite the metadata columns of an existing row.
    async fn update_book(&self, book: &BookRecord) -> Result<()>;

    /// Delete a book row outright, cascading its favorites entry and
    /// bookmarks. Deleting an unknown id is a no-op.
    async fn delete_book(&self, id: BookId) -> Result<()>;

    /// Batch-flip the existing flag.
    async fn set_existing(&self, ids: &[BookId], existing: bool) -> Result<()>;

    /// The recency list, most recent first.
    async fn load_recent_ids(&self) -> Result<Vec<BookId>>;
    async fn save_recent_ids(&self, ids: &[BookId]) -> Result<()>;

    async fn load_favorite_ids(&self) -> Result<Vec<BookId>>;
    async fn add_favorite(&self, id: BookId) -> Result<()>;
    async fn remove_favorite(&self, id: BookId) -> Result<()>;

    /// Bookmarks for one book; `visible_only` filters out implicit
    /// position markers.
    async fn load_bookmarks(&self, book_id: BookId, visible_only: bool) -> Result<Vec<Bookmark>>;
    async fn load_all_visible_bookmarks(&self) -> Result<Vec<Bookmark>>;
    /// Insert or update a bookmark; returns its id.
    async fn save_bookmark(&self, bookmark: &Bookmark) -> Result<i64>;
    async fn delete_bookmark(&self, id: i64) -> Result<()>;
}
