//! SQLite implementation of the [`Gateway`] contract.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::gateway::Gateway;
use crate::models::{BookId, BookRecord, Bookmark, FileIdRecord, NewBook, Position};
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use folio_meta::BookMeta;
use folio_vfs::{FileRef, Fingerprint};
use sqlx::SqlitePool;
use std::path::PathBuf;
use time::UtcDateTime;

/// Gateway backed by the SQLite catalog database.
#[derive(Debug, Clone)]
pub struct SqliteGateway {
    pool: SqlitePool,
}

impl From<&Database> for SqliteGateway {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}

// File references are stored as (kind, path, entry) triples; `entry` is the
// empty string rather than NULL so the file_ids uniqueness constraint
// actually deduplicates.

fn encode_ref(file: &FileRef) -> Result<(&'static str, String, String)> {
    let as_text = |path: &PathBuf| -> Result<String> {
        Ok(path.to_str().ok_or_raise(|| ErrorKind::InvalidData("non-utf8 path"))?.to_string())
    };
    Ok(match file {
        FileRef::Physical(path) => ("file", as_text(path)?, String::new()),
        FileRef::ArchiveEntry { archive, entry } => ("member", as_text(archive)?, entry.clone()),
        FileRef::Builtin(name) => ("builtin", name.clone(), String::new()),
    })
}

fn decode_ref(kind: &str, path: String, entry: String) -> Result<FileRef> {
    Ok(match kind {
        "file" => FileRef::Physical(PathBuf::from(path)),
        "member" => FileRef::ArchiveEntry { archive: PathBuf::from(path), entry },
        "builtin" => FileRef::Builtin(path),
        _ => exn::bail!(ErrorKind::InvalidData("unknown file-ref kind")),
    })
}

#[derive(sqlx::FromRow)]
struct BookRow {
    book_id: i64,
    file_id: i64,
    kind: String,
    path: String,
    entry: String,
    title: String,
    authors: String,
    language: Option<String>,
    series: Option<String>,
    tags: String,
    existing: bool,
}

impl TryFrom<BookRow> for BookRecord {
    type Error = crate::error::Error;
    fn try_from(row: BookRow) -> Result<Self> {
        Ok(Self {
            id: row.book_id,
            file_id: row.file_id,
            file: decode_ref(&row.kind, row.path, row.entry)?,
            meta: BookMeta {
                title: row.title,
                authors: serde_json::from_str(&row.authors).or_raise(|| ErrorKind::InvalidData("authors list"))?,
                language: row.language,
                series: row.series,
                tags: serde_json::from_str(&row.tags).or_raise(|| ErrorKind::InvalidData("tags list"))?,
            },
            existing: row.existing,
        })
    }
}

#[derive(sqlx::FromRow)]
struct FileIdRow {
    file_id: i64,
    kind: String,
    path: String,
    entry: String,
    size: i64,
    mtime: i64,
}

impl TryFrom<FileIdRow> for FileIdRecord {
    type Error = crate::error::Error;
    fn try_from(row: FileIdRow) -> Result<Self> {
        Ok(Self {
            file_id: row.file_id,
            file: decode_ref(&row.kind, row.path, row.entry)?,
            fingerprint: Fingerprint::new(
                u64::try_from(row.size).or_raise(|| ErrorKind::InvalidData("file size"))?,
                row.mtime,
            ),
        })
    }
}

#[derive(sqlx::FromRow)]
struct BookmarkRow {
    bookmark_id: i64,
    book_id: i64,
    paragraph: i64,
    element: i64,
    char_offset: i64,
    text: String,
    visible: bool,
    created_at: i64,
}

impl TryFrom<BookmarkRow> for Bookmark {
    type Error = crate::error::Error;
    fn try_from(row: BookmarkRow) -> Result<Self> {
        let coord = |value: i64, field| -> Result<u32> {
            u32::try_from(value).or_raise(|| ErrorKind::InvalidData(field))
        };
        Ok(Self {
            id: Some(row.bookmark_id),
            book_id: row.book_id,
            position: Position {
                paragraph: coord(row.paragraph, "bookmark paragraph")?,
                element: coord(row.element, "bookmark element")?,
                char_offset: coord(row.char_offset, "bookmark char offset")?,
            },
            text: row.text,
            visible: row.visible,
            created_at: UtcDateTime::from_unix_timestamp(row.created_at)
                .or_raise(|| ErrorKind::InvalidData("bookmark timestamp"))?,
        })
    }
}

const SELECT_BOOK: &str = "SELECT b.book_id, b.file_id, f.kind, f.path, f.entry, \
     b.title, b.authors, b.language, b.series, b.tags, b.existing \
     FROM books b JOIN file_ids f ON f.file_id = b.file_id";

#[async_trait]
impl Gateway for SqliteGateway {
    async fn load_books(&self, existing: bool) -> Result<Vec<BookRecord>> {
        let rows: Vec<BookRow> = sqlx::query_as(&format!("{SELECT_BOOK} WHERE b.existing = ? ORDER BY b.book_id"))
            .bind(existing)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(BookRecord::try_from).collect()
    }

    async fn load_book(&self, id: BookId) -> Result<Option<BookRecord>> {
        let row: Option<BookRow> = sqlx::query_as(&format!("{SELECT_BOOK} WHERE b.book_id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(BookRecord::try_from).transpose()
    }

    async fn load_file_ids(&self) -> Result<Vec<FileIdRecord>> {
        let rows: Vec<FileIdRow> =
            sqlx::query_as("SELECT file_id, kind, path, entry, size, mtime FROM file_ids ORDER BY file_id")
                .fetch_all(&self.pool)
                .await
                .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(FileIdRecord::try_from).collect()
    }

    async fn save_file_ids(&self, records: &[FileIdRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        for record in records {
            let (kind, path, entry) = encode_ref(&record.file)?;
            sqlx::query(
                "INSERT INTO file_ids (file_id, kind, path, entry, size, mtime) VALUES (?, ?, ?, ?, ?, ?) \
                 ON CONFLICT (file_id) DO UPDATE SET size = excluded.size, mtime = excluded.mtime",
            )
            .bind(record.file_id)
            .bind(kind)
            .bind(path)
            .bind(entry)
            .bind(i64::try_from(record.fingerprint.size).or_raise(|| ErrorKind::InvalidData("file size"))?)
            .bind(record.fingerprint.mtime)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)
    }

    async fn insert_books(&self, books: &[NewBook]) -> Result<Vec<BookRecord>> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let mut created = Vec::with_capacity(books.len());
        for book in books {
            let authors = serde_json::to_string(&book.meta.authors).or_raise(|| ErrorKind::InvalidData("authors"))?;
            let tags = serde_json::to_string(&book.meta.tags).or_raise(|| ErrorKind::InvalidData("tags"))?;
            let id: i64 = sqlx::query_scalar(
                "INSERT INTO books (file_id, title, authors, language, series, tags, existing) \
                 VALUES (?, ?, ?, ?, ?, ?, 1) RETURNING book_id",
            )
            .bind(book.file_id)
            .bind(&book.meta.title)
            .bind(authors)
            .bind(&book.meta.language)
            .bind(&book.meta.series)
            .bind(tags)
            .fetch_one(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
            created.push(BookRecord {
                id,
                file_id: book.file_id,
                file: book.file.clone(),
                meta: book.meta.clone(),
                existing: true,
            });
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(created)
    }

    async fn update_book(&self, book: &BookRecord) -> Result<()> {
        let authors = serde_json::to_string(&book.meta.authors).or_raise(|| ErrorKind::InvalidData("authors"))?;
        let tags = serde_json::to_string(&book.meta.tags).or_raise(|| ErrorKind::InvalidData("tags"))?;
        sqlx::query("UPDATE books SET title = ?, authors = ?, language = ?, series = ?, tags = ? WHERE book_id = ?")
            .bind(&book.meta.title)
            .bind(authors)
            .bind(&book.meta.language)
            .bind(&book.meta.series)
            .bind(tags)
            .bind(book.id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    async fn delete_book(&self, id: BookId) -> Result<()> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        sqlx::query("DELETE FROM favorites WHERE book_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        sqlx::query("DELETE FROM bookmarks WHERE book_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        sqlx::query("DELETE FROM books WHERE book_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tx.commit().await.or_raise(|| ErrorKind::Database)
    }

    async fn set_existing(&self, ids: &[BookId], existing: bool) -> Result<()> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        for id in ids {
            sqlx::query("UPDATE books SET existing = ? WHERE book_id = ?")
                .bind(existing)
                .bind(id)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)
    }

    async fn load_recent_ids(&self) -> Result<Vec<BookId>> {
        sqlx::query_scalar("SELECT book_id FROM recent_books ORDER BY position")
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    async fn save_recent_ids(&self, ids: &[BookId]) -> Result<()> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        sqlx::query("DELETE FROM recent_books").execute(&mut *tx).await.or_raise(|| ErrorKind::Database)?;
        for (position, id) in ids.iter().enumerate() {
            sqlx::query("INSERT INTO recent_books (position, book_id) VALUES (?, ?)")
                .bind(i64::try_from(position).or_raise(|| ErrorKind::InvalidData("recency position"))?)
                .bind(id)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)
    }

    async fn load_favorite_ids(&self) -> Result<Vec<BookId>> {
        sqlx::query_scalar("SELECT book_id FROM favorites ORDER BY book_id")
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    async fn add_favorite(&self, id: BookId) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO favorites (book_id) VALUES (?)")
            .bind(id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    async fn remove_favorite(&self, id: BookId) -> Result<()> {
        sqlx::query("DELETE FROM favorites WHERE book_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    async fn load_bookmarks(&self, book_id: BookId, visible_only: bool) -> Result<Vec<Bookmark>> {
        let rows: Vec<BookmarkRow> = sqlx::query_as(
            "SELECT bookmark_id, book_id, paragraph, element, char_offset, text, visible, created_at \
             FROM bookmarks WHERE book_id = ? AND (visible OR NOT ?) ORDER BY created_at",
        )
        .bind(book_id)
        .bind(visible_only)
        .fetch_all(&self.pool)
        .await
        .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Bookmark::try_from).collect()
    }

    async fn load_all_visible_bookmarks(&self) -> Result<Vec<Bookmark>> {
        let rows: Vec<BookmarkRow> = sqlx::query_as(
            "SELECT bookmark_id, book_id, paragraph, element, char_offset, text, visible, created_at \
             FROM bookmarks WHERE visible ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Bookmark::try_from).collect()
    }

    async fn save_bookmark(&self, bookmark: &Bookmark) -> Result<i64> {
        let coord = |value: u32| i64::from(value);
        match bookmark.id {
            Some(id) => {
                sqlx::query(
                    "UPDATE bookmarks SET paragraph = ?, element = ?, char_offset = ?, text = ?, visible = ? \
                     WHERE bookmark_id = ?",
                )
                .bind(coord(bookmark.position.paragraph))
                .bind(coord(bookmark.position.element))
                .bind(coord(bookmark.position.char_offset))
                .bind(&bookmark.text)
                .bind(bookmark.visible)
                .bind(id)
                .execute(&self.pool)
                .await
                .or_raise(|| ErrorKind::Database)?;
                Ok(id)
            },
            None => sqlx::query_scalar(
                "INSERT INTO bookmarks (book_id, paragraph, element, char_offset, text, visible, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING bookmark_id",
            )
            .bind(bookmark.book_id)
            .bind(coord(bookmark.position.paragraph))
            .bind(coord(bookmark.position.element))
            .bind(coord(bookmark.position.char_offset))
            .bind(&bookmark.text)
            .bind(bookmark.visible)
            .bind(bookmark.created_at.unix_timestamp())
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database),
        }
    }

    async fn delete_bookmark(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM bookmarks WHERE bookmark_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }
}
