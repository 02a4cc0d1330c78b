//! Persistence gateway for the folio catalog.
//!
//! The catalog never talks SQL. It talks to a [`Gateway`]: load rows by
//! existing-flag, persist file-id assignments, keep the recency list and
//! favorites set, and write new books atomically. [`SqliteGateway`] is the
//! real implementation (SQLite via sqlx, embedded migrations);
//! [`MemoryGateway`] (behind the `mock` feature) backs the catalog's tests.
//!
//! The database is bookkeeping, not the source of truth; the files on disk
//! are. A deleted database is rebuilt by the next reconciliation pass, at
//! the cost of fresh ids.

mod db;
pub mod error;
mod gateway;
#[cfg(feature = "mock")]
mod memory;
mod models;
mod sqlite;

pub use crate::db::Database;
pub use crate::gateway::{Gateway, GatewayHandle};
#[cfg(feature = "mock")]
pub use crate::memory::MemoryGateway;
pub use crate::models::{BookId, BookRecord, Bookmark, FileId, FileIdRecord, NewBook, Position};
pub use crate::sqlite::SqliteGateway;
