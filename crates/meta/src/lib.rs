//! Book metadata contract.
//!
//! The catalog does not parse book content. It asks a [`MetaReader`] for a
//! [`BookMeta`] and treats any failure as "this file is not a readable book",
//! the one recoverable error class the reconciliation engine is built
//! around. [`FormatReader`] is the shipped implementation: it sniffs the
//! format from the file name and magic bytes and pulls out display metadata
//! cheaply, without a full rendering pipeline behind it.

pub mod error;
mod format;
mod models;
mod reader;

pub use crate::format::Format;
pub use crate::models::BookMeta;
#[cfg(feature = "mock")]
pub use crate::reader::MockReader;
pub use crate::reader::{FormatReader, MetaReader, extract};
use std::sync::Arc;

pub type ReaderHandle = Arc<dyn MetaReader + Send + Sync>;
