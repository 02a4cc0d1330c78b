//! The folio collection store and its reconciliation engine.
//!
//! [`Catalog`] keeps the live in-memory book index and answers for its
//! agreement with two slower sources of truth: the filesystem (through a
//! `folio_vfs::FileTree`) and the persisted rows (through a
//! `folio_db::Gateway`). Agreement is restored by the reconciliation pass in
//! [`build`], which can run inline ([`Catalog::build_once`]) or on a worker
//! task ([`Catalog::start_build`]); everything the catalog does is announced
//! on an [`EventBus`].

mod book;
mod build;
mod catalog;
pub mod error;
mod events;
mod fileset;

pub use crate::book::Book;
pub use crate::build::{BuildReport, SkipReason};
pub use crate::catalog::{Catalog, RECENT_LIST_CAP};
pub use crate::events::{BookEventKind, BuildEventKind, CatalogEvent, EventBus};
pub use crate::fileset::FileIdentitySet;
