//! Collection store operations: add/remove, favorites, recency, bookmarks.

use folio_catalog::{BookEventKind, Catalog, CatalogEvent, RECENT_LIST_CAP};
use folio_db::{Bookmark, FileIdRecord, Gateway, MemoryGateway, NewBook, Position};
use folio_meta::{BookMeta, FormatReader};
use folio_vfs::{FileRef, FileTree, Fingerprint, tree::MockTree};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

fn fb2(title: &str) -> Vec<u8> {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<FictionBook xmlns="http://www.gribuser.ru/xml/fictionbook/2.0">
  <description>
    <title-info><book-title>{title}</book-title><lang>en</lang></title-info>
  </description>
  <body/>
</FictionBook>"#
    )
    .into_bytes()
}

struct Fixture {
    catalog: Arc<Catalog>,
    gateway: Arc<MemoryGateway>,
    tree: Arc<MockTree>,
}

fn fixture(tree: MockTree) -> Fixture {
    let gateway = Arc::new(MemoryGateway::new());
    let tree = Arc::new(tree);
    let catalog = Arc::new(Catalog::new(gateway.clone(), tree.clone(), Arc::new(FormatReader)));
    Fixture { catalog, gateway, tree }
}

fn physical(path: &str) -> FileRef {
    FileRef::Physical(PathBuf::from(path))
}

fn book_events(receiver: &mut UnboundedReceiver<CatalogEvent>) -> Vec<(BookEventKind, String)> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        if let CatalogEvent::Book(kind, book) = event {
            events.push((kind, book.meta.title));
        }
    }
    events
}

#[tokio::test]
async fn test_add_is_idempotent() {
    let fx = fixture(MockTree::with_files([("a.fb2", fb2("Alpha"))]));
    let mut events = fx.catalog.subscribe();

    let first = fx.catalog.add(physical("a.fb2")).await.unwrap();
    assert!(first.id.is_some());
    let second = fx.catalog.add(physical("a.fb2")).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(fx.catalog.len(), 1);
    // Exactly one Added event for the pair of calls.
    assert_eq!(book_events(&mut events), vec![(BookEventKind::Added, "Alpha".to_string())]);
}

#[tokio::test]
async fn test_add_unreadable_file_fails_cleanly() {
    let fx = fixture(MockTree::with_files([("junk.fb2", b"not xml".to_vec())]));
    assert!(fx.catalog.add(physical("junk.fb2")).await.is_err());
    assert!(fx.catalog.is_empty());
}

#[tokio::test]
async fn test_add_adopts_a_concurrently_inserted_row() {
    let fx = fixture(MockTree::with_files([("a.fb2", fb2("Alpha"))]));

    // Another writer catalogued the same file between our index check and
    // the insert; its row carries the file identity the insert will claim.
    fx.gateway
        .save_file_ids(&[FileIdRecord {
            file_id: 1,
            file: physical("a.fb2"),
            fingerprint: Fingerprint::new(1, 1),
        }])
        .await
        .unwrap();
    let seeded = fx
        .gateway
        .insert_books(&[NewBook {
            file_id: 1,
            file: physical("a.fb2"),
            meta: BookMeta::titled("Alpha"),
        }])
        .await
        .unwrap();

    let mut events = fx.catalog.subscribe();
    let book = fx.catalog.add(physical("a.fb2")).await.unwrap();
    assert_eq!(book.id, Some(seeded[0].id));
    assert_eq!(fx.gateway.all_books().len(), 1);
    assert_eq!(book_events(&mut events), vec![(BookEventKind::Added, "Alpha".to_string())]);
}

#[tokio::test]
async fn test_add_revives_an_orphaned_row() {
    let fx = fixture(MockTree::with_files([("a.fb2", fb2("Alpha"))]));
    fx.catalog.build_once().await.unwrap();
    let original_id = fx.catalog.book_by_file(&physical("a.fb2")).unwrap().id;

    fx.tree.remove_file("a.fb2");
    fx.catalog.build_once().await.unwrap();
    assert!(fx.catalog.book_by_file(&physical("a.fb2")).is_none());

    fx.tree.add_file("a.fb2", fb2("Alpha"));
    let revived = fx.catalog.add(physical("a.fb2")).await.unwrap();
    assert_eq!(revived.id, original_id);
}

#[tokio::test]
async fn test_remove_deletes_row_and_optionally_file() {
    let fx = fixture(MockTree::with_files([("a.fb2", fb2("Alpha")), ("b.fb2", fb2("Beta"))]));
    fx.catalog.build_once().await.unwrap();
    let alpha = fx.catalog.book_by_file(&physical("a.fb2")).unwrap();
    let beta = fx.catalog.book_by_file(&physical("b.fb2")).unwrap();

    let mut events = fx.catalog.subscribe();
    assert!(!fx.catalog.remove(&alpha, false).await.unwrap());
    assert!(fx.tree.exists(Path::new("a.fb2")).await.unwrap());
    assert!(fx.catalog.book_by_id(alpha.id.unwrap()).await.unwrap().is_none());
    assert_eq!(book_events(&mut events), vec![(BookEventKind::Removed, "Alpha".to_string())]);

    assert!(fx.catalog.remove(&beta, true).await.unwrap());
    assert!(!fx.tree.exists(Path::new("b.fb2")).await.unwrap());
}

#[tokio::test]
async fn test_remove_archive_member_spares_the_archive() {
    let tree = MockTree::new();
    tree.add_archive("bundle.zip", [("a.fb2", fb2("Alpha")), ("b.fb2", fb2("Beta"))]);
    let fx = fixture(tree);
    fx.catalog.build_once().await.unwrap();
    let member = FileRef::ArchiveEntry {
        archive: PathBuf::from("bundle.zip"),
        entry: "a.fb2".to_string(),
    };
    let book = fx.catalog.book_by_file(&member).unwrap();

    // The row goes, but the archive stays: the sibling book still lives in
    // it, and the caller is told no file was deleted.
    assert!(!fx.catalog.remove(&book, true).await.unwrap());
    assert!(fx.tree.exists(Path::new("bundle.zip")).await.unwrap());
    assert!(fx.catalog.book_by_file(&member).is_none());
    let sibling = FileRef::ArchiveEntry {
        archive: PathBuf::from("bundle.zip"),
        entry: "b.fb2".to_string(),
    };
    assert!(fx.catalog.book_by_file(&sibling).is_some());
}

#[tokio::test]
async fn test_remove_cascades_favorites_bookmarks_and_recency() {
    let fx = fixture(MockTree::with_files([("a.fb2", fb2("Alpha"))]));
    fx.catalog.build_once().await.unwrap();
    let book = fx.catalog.book_by_file(&physical("a.fb2")).unwrap();
    let id = book.id.unwrap();

    fx.catalog.set_favorite(&book, true).await.unwrap();
    fx.catalog.touch_recent(&book).await.unwrap();
    fx.catalog
        .save_bookmark(Bookmark::new(id, Position { paragraph: 3, element: 0, char_offset: 12 }, "quote", true))
        .await
        .unwrap();

    fx.catalog.remove(&book, false).await.unwrap();
    assert!(fx.catalog.favorite_books().await.unwrap().is_empty());
    assert!(fx.catalog.recent_books().await.unwrap().is_empty());
    assert!(fx.gateway.load_bookmarks(id, false).await.unwrap().is_empty());
    assert!(fx.gateway.load_recent_ids().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_removed_book_is_rediscovered_as_new() {
    let fx = fixture(MockTree::with_files([("a.fb2", fb2("Alpha"))]));
    fx.catalog.build_once().await.unwrap();
    let book = fx.catalog.book_by_file(&physical("a.fb2")).unwrap();

    // Removed from the catalog but left on disk: the next pass picks the
    // file up again as a brand-new book.
    fx.catalog.remove(&book, false).await.unwrap();
    let report = fx.catalog.build_once().await.unwrap();
    assert_eq!(report.created, 1);
    assert_eq!(report.resurrected, 0);
    let reborn = fx.catalog.book_by_file(&physical("a.fb2")).unwrap();
    assert_ne!(reborn.id, book.id);
}

#[tokio::test]
async fn test_recency_is_bounded_deduplicated_and_ordered() {
    let tree = MockTree::new();
    for index in 0..(RECENT_LIST_CAP + 2) {
        tree.add_file(format!("b{index:02}.fb2"), fb2(&format!("Book {index:02}")));
    }
    let fx = fixture(tree);
    fx.catalog.build_once().await.unwrap();

    // Touch every shelf book in discovery order, leaving the help book out.
    let books = fx.catalog.books();
    for book in books.iter().filter(|book| !matches!(book.file, FileRef::Builtin(_))) {
        fx.catalog.touch_recent(book).await.unwrap();
    }
    let recent = fx.catalog.recent_books().await.unwrap();
    assert_eq!(recent.len(), RECENT_LIST_CAP);
    // Most recently touched first; the earliest touches fell off the end.
    assert_eq!(recent[0].meta.title, format!("Book {:02}", RECENT_LIST_CAP + 1));

    // Touching an already-listed book moves it to the front, no duplicate.
    let moved = recent[3].clone();
    fx.catalog.touch_recent(&moved).await.unwrap();
    let recent = fx.catalog.recent_books().await.unwrap();
    assert_eq!(recent.len(), RECENT_LIST_CAP);
    assert_eq!(recent[0], moved);
    assert_eq!(recent.iter().filter(|book| **book == moved).count(), 1);

    assert_eq!(fx.catalog.recent_book(0).await.unwrap(), Some(moved));
    assert_eq!(fx.catalog.recent_book(RECENT_LIST_CAP).await.unwrap(), None);
}

#[tokio::test]
async fn test_set_favorite_announces_update() {
    let fx = fixture(MockTree::with_files([("a.fb2", fb2("Alpha"))]));
    fx.catalog.build_once().await.unwrap();
    let alpha = fx.catalog.book_by_file(&physical("a.fb2")).unwrap();

    let mut events = fx.catalog.subscribe();
    fx.catalog.set_favorite(&alpha, true).await.unwrap();
    assert_eq!(book_events(&mut events), vec![(BookEventKind::Updated, "Alpha".to_string())]);
    fx.catalog.set_favorite(&alpha, false).await.unwrap();
    assert_eq!(book_events(&mut events), vec![(BookEventKind::Updated, "Alpha".to_string())]);
}

#[tokio::test]
async fn test_favorites_round_trip() {
    let fx = fixture(MockTree::with_files([("a.fb2", fb2("Alpha")), ("b.fb2", fb2("Beta"))]));
    fx.catalog.build_once().await.unwrap();
    let alpha = fx.catalog.book_by_file(&physical("a.fb2")).unwrap();
    let beta = fx.catalog.book_by_file(&physical("b.fb2")).unwrap();

    fx.catalog.set_favorite(&alpha, true).await.unwrap();
    fx.catalog.set_favorite(&beta, true).await.unwrap();
    let favorites = fx.catalog.favorite_books().await.unwrap();
    assert_eq!(favorites.len(), 2);

    fx.catalog.set_favorite(&alpha, false).await.unwrap();
    assert_eq!(fx.catalog.favorite_books().await.unwrap(), vec![beta]);
}

#[tokio::test]
async fn test_bookmark_pass_through() {
    let fx = fixture(MockTree::with_files([("a.fb2", fb2("Alpha"))]));
    fx.catalog.build_once().await.unwrap();
    let book = fx.catalog.book_by_file(&physical("a.fb2")).unwrap();
    let id = book.id.unwrap();

    let visible = fx
        .catalog
        .save_bookmark(Bookmark::new(id, Position { paragraph: 1, element: 0, char_offset: 0 }, "seen", true))
        .await
        .unwrap();
    assert!(visible.id.is_some());
    let marker = fx
        .catalog
        .save_bookmark(Bookmark::new(id, Position { paragraph: 9, element: 0, char_offset: 0 }, "", false))
        .await
        .unwrap();

    assert_eq!(fx.catalog.bookmarks(&book, true).await.unwrap(), vec![visible.clone()]);
    assert_eq!(fx.catalog.bookmarks(&book, false).await.unwrap().len(), 2);
    assert_eq!(fx.catalog.all_visible_bookmarks().await.unwrap(), vec![visible.clone()]);

    fx.catalog.delete_bookmark(&visible).await.unwrap();
    assert!(fx.catalog.bookmarks(&book, true).await.unwrap().is_empty());
    // Deleting an unsaved bookmark is a no-op.
    fx.catalog.delete_bookmark(&Bookmark::new(id, marker.position, "", true)).await.unwrap();
}

#[tokio::test]
async fn test_hydrate_by_id_after_restart() {
    let fx = fixture(MockTree::with_files([("a.fb2", fb2("Alpha"))]));
    fx.catalog.build_once().await.unwrap();
    let id = fx.catalog.book_by_file(&physical("a.fb2")).unwrap().id.unwrap();

    // Fresh catalog, empty index, same gateway: the id still resolves.
    let reborn = Catalog::new(fx.gateway.clone(), fx.tree.clone(), Arc::new(FormatReader));
    let mut events = reborn.subscribe();
    let book = reborn.book_by_id(id).await.unwrap().unwrap();
    assert_eq!(book.meta.title, "Alpha");
    assert_eq!(book_events(&mut events), vec![(BookEventKind::Added, "Alpha".to_string())]);
    // Second lookup is served from the index.
    assert_eq!(reborn.book_by_id(id).await.unwrap(), Some(book));
    assert!(book_events(&mut events).is_empty());

    assert_eq!(reborn.book_by_id(9999).await.unwrap(), None);
}

#[tokio::test]
async fn test_hydrate_rereads_changed_file() {
    let fx = fixture(MockTree::with_files([("a.fb2", fb2("Old Title"))]));
    fx.catalog.build_once().await.unwrap();
    let id = fx.catalog.book_by_file(&physical("a.fb2")).unwrap().id.unwrap();

    fx.tree.add_file("a.fb2", fb2("New Title"));
    let reborn = Catalog::new(fx.gateway.clone(), fx.tree.clone(), Arc::new(FormatReader));
    let book = reborn.book_by_id(id).await.unwrap().unwrap();
    assert_eq!(book.meta.title, "New Title");

    // The file vanishing makes the same id unresolvable.
    fx.tree.remove_file("a.fb2");
    let reborn = Catalog::new(fx.gateway.clone(), fx.tree.clone(), Arc::new(FormatReader));
    assert_eq!(reborn.book_by_id(id).await.unwrap(), None);
}
