//! Filesystem abstraction for the folio catalog.
//!
//! The reconciliation engine never touches `std::fs` directly. Everything it
//! knows about the world comes through a [`FileTree`]: directory listings,
//! cheap change fingerprints, archive member enumeration, and raw bytes for
//! metadata extraction. Books themselves are addressed by [`FileRef`], which
//! may point at a plain file, at an entry inside an archive container, or at
//! a builtin resource bundled with the application (the help book).

pub mod error;
mod file;
mod path;
pub mod tree;

pub use crate::file::{DirEntry, FileRef, Fingerprint, is_container, is_single_book_container};
pub use crate::path::validate as validate_path;
pub use crate::tree::FileTree;
use std::sync::Arc;

pub type TreeHandle = Arc<dyn FileTree + Send + Sync>;
