//! Domain records crossing the gateway boundary.
//!
//! The gateway deals in these records, never in the catalog's in-memory
//! `Book` type. The catalog decides what becomes a live book; the gateway
//! only remembers rows.

use folio_meta::BookMeta;
use folio_vfs::{FileRef, Fingerprint};
use time::UtcDateTime;

/// Persisted book row id.
pub type BookId = i64;
/// Persisted file identity id, assigned by the File Identity Cache.
pub type FileId = i64;

/// One persisted file-identity assignment: identity key (the file
/// reference), its numeric id, and the last-seen fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIdRecord {
    pub file_id: FileId,
    pub file: FileRef,
    pub fingerprint: Fingerprint,
}

/// A persisted catalog row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookRecord {
    pub id: BookId,
    pub file_id: FileId,
    pub file: FileRef,
    pub meta: BookMeta,
    /// Whether the last reconciliation pass found the backing file on disk.
    /// Rows with `existing == false` are orphans awaiting resurrection.
    pub existing: bool,
}

/// A book discovered this pass, not yet persisted (no row id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBook {
    pub file_id: FileId,
    pub file: FileRef,
    pub meta: BookMeta,
}

/// A location within a book's content model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub paragraph: u32,
    pub element: u32,
    pub char_offset: u32,
}

/// A reader bookmark. `id` is `None` until saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bookmark {
    pub id: Option<i64>,
    pub book_id: BookId,
    pub position: Position,
    /// Snapshot of the text at the bookmarked position.
    pub text: String,
    /// Explicit user bookmarks are visible; position-on-close markers are not.
    pub visible: bool,
    pub created_at: UtcDateTime,
}

impl Bookmark {
    pub fn new(book_id: BookId, position: Position, text: impl Into<String>, visible: bool) -> Self {
        Self {
            id: None,
            book_id,
            position,
            text: text.into(),
            visible,
            created_at: UtcDateTime::now(),
        }
    }
}
