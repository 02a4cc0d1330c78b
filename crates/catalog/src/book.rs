use folio_db::{BookId, BookRecord};
use folio_meta::BookMeta;
use folio_vfs::FileRef;

/// A live book in the collection store.
///
/// `id` is `None` only for books that have not been flushed to the gateway
/// yet (mid-pass candidates); every book handed out by the catalog carries a
/// real row id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Book {
    pub id: Option<BookId>,
    pub file: FileRef,
    pub meta: BookMeta,
}

impl Book {
    pub fn title(&self) -> &str {
        &self.meta.title
    }
}

impl From<BookRecord> for Book {
    fn from(record: BookRecord) -> Self {
        Self {
            id: Some(record.id),
            file: record.file,
            meta: record.meta,
        }
    }
}
