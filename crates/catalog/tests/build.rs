//! Reconciliation pass behavior, end to end over in-memory collaborators.

use folio_catalog::{BookEventKind, BuildEventKind, Catalog, CatalogEvent, SkipReason};
use folio_db::{FileIdRecord, Gateway, MemoryGateway, NewBook};
use folio_meta::{BookMeta, FormatReader, MockReader};
use folio_vfs::{FileRef, Fingerprint, tree::MockTree};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

fn fb2(title: &str) -> Vec<u8> {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<FictionBook xmlns="http://www.gribuser.ru/xml/fictionbook/2.0">
  <description>
    <title-info>
      <author><first-name>Ada</first-name><last-name>Quill</last-name></author>
      <book-title>{title}</book-title>
      <lang>en</lang>
    </title-info>
  </description>
  <body/>
</FictionBook>"#
    )
    .into_bytes()
}

const EPUB_MAGIC: &[u8] = b"PK\x03\x04rest-of-container";

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

fn drain(receiver: &mut UnboundedReceiver<CatalogEvent>) -> Vec<CatalogEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

fn added_titles(events: &[CatalogEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            CatalogEvent::Book(BookEventKind::Added, book) => Some(book.meta.title.clone()),
            _ => None,
        })
        .collect()
}

fn physical(path: &str) -> FileRef {
    FileRef::Physical(PathBuf::from(path))
}

#[tokio::test]
async fn test_first_pass_discovers_books_and_help() {
    let tree = MockTree::with_files([("a.epub", EPUB_MAGIC.to_vec()), ("shelf/b.fb2", fb2("Beta"))]);
    let fx = fixture(tree);
    let mut events = fx.catalog.subscribe();

    let report = fx.catalog.build_once().await.unwrap();
    assert_eq!(report.created, 3);
    assert_eq!(report.indexed, 0);
    assert!(report.skipped.is_empty());
    assert_eq!(fx.catalog.len(), 3);

    let events = drain(&mut events);
    assert_eq!(events.first(), Some(&CatalogEvent::Build(BuildEventKind::Started)));
    assert_eq!(events.last(), Some(&CatalogEvent::Build(BuildEventKind::Completed)));
    assert!(events.contains(&CatalogEvent::Build(BuildEventKind::Succeeded)));
    let mut titles = added_titles(&events);
    titles.sort();
    assert_eq!(titles, vec!["Beta", "Welcome to Folio", "a"]);

    let help = fx.catalog.book_by_file(&FileRef::Builtin("help/intro.fb2".to_string())).unwrap();
    assert_eq!(help.meta.title, "Welcome to Folio");
}

#[tokio::test]
async fn test_archive_members_and_corrupt_files() {
    // One good epub, one corrupt epub, one zip with a book inside.
    let tree = MockTree::with_files([("a.epub", EPUB_MAGIC.to_vec()), ("b.epub", b"not a zip".to_vec())]);
    tree.add_archive("archive.zip", [("c.fb2", fb2("Gamma")), ("notes.md", b"readme".to_vec())]);
    let fx = fixture(tree);

    let report = fx.catalog.build_once().await.unwrap();
    // a.epub, c.fb2 inside the archive, and the help book.
    assert_eq!(report.created, 3);
    assert!(report.skipped.contains(&(physical("b.epub"), SkipReason::UnreadableContent)));
    let notes = FileRef::ArchiveEntry {
        archive: PathBuf::from("archive.zip"),
        entry: "notes.md".to_string(),
    };
    assert!(report.skipped.contains(&(notes, SkipReason::UnsupportedFormat)));

    let member = FileRef::ArchiveEntry {
        archive: PathBuf::from("archive.zip"),
        entry: "c.fb2".to_string(),
    };
    assert_eq!(fx.catalog.book_by_file(&member).unwrap().meta.title, "Gamma");
    // The container itself is not a book and not a skip.
    assert!(fx.catalog.book_by_file(&physical("archive.zip")).is_none());
    assert!(!report.skipped.iter().any(|(file, _)| *file == physical("archive.zip")));
}

#[tokio::test]
async fn test_second_pass_is_idempotent() {
    let tree = MockTree::with_files([("a.epub", EPUB_MAGIC.to_vec()), ("b.fb2", fb2("Beta"))]);
    let fx = fixture(tree);
    let first = fx.catalog.build_once().await.unwrap();
    assert_eq!(first.created, 3);

    let mut events = fx.catalog.subscribe();
    let second = fx.catalog.build_once().await.unwrap();
    assert_eq!(second.created, 0);
    assert_eq!(second.indexed, 3);
    assert_eq!(second.orphaned, 0);
    assert_eq!(second.resurrected, 0);
    assert_eq!(fx.catalog.len(), 3);
    // Nothing changed, so no book events at all.
    let events = drain(&mut events);
    assert!(events.iter().all(|event| matches!(event, CatalogEvent::Build(_))));
}

#[tokio::test]
async fn test_unchanged_files_are_not_reread() {
    let gateway = Arc::new(MemoryGateway::new());
    let tree = Arc::new(MockTree::with_files([("a.fb2", fb2("Alpha"))]));
    let reader = Arc::new(MockReader::new());
    let catalog = Catalog::new(gateway, tree, reader.clone());

    catalog.build_once().await.unwrap();
    let reads_after_first = reader.reads().len();
    assert_eq!(reads_after_first, 1);

    catalog.build_once().await.unwrap();
    assert_eq!(reader.reads().len(), reads_after_first);
}

#[tokio::test]
async fn test_missing_file_orphans_then_resurrects_with_same_id() {
    let tree = MockTree::with_files([("a.fb2", fb2("Alpha")), ("b.fb2", fb2("Beta"))]);
    let fx = fixture(tree);
    fx.catalog.build_once().await.unwrap();
    let original = fx.catalog.book_by_file(&physical("b.fb2")).unwrap();
    let original_id = original.id.unwrap();

    fx.tree.remove_file("b.fb2");
    let mut events = fx.catalog.subscribe();
    let report = fx.catalog.build_once().await.unwrap();
    assert_eq!(report.orphaned, 1);
    assert_eq!(fx.catalog.len(), 2);
    assert!(fx.catalog.book_by_id(original_id).await.unwrap().is_none());
    let events = drain(&mut events);
    assert!(events.contains(&CatalogEvent::Book(BookEventKind::Removed, original.clone())));

    fx.tree.add_file("b.fb2", fb2("Beta"));
    let report = fx.catalog.build_once().await.unwrap();
    assert_eq!(report.resurrected, 1);
    assert_eq!(report.created, 0);
    let revived = fx.catalog.book_by_file(&physical("b.fb2")).unwrap();
    assert_eq!(revived.id, Some(original_id));
}

#[tokio::test]
async fn test_changed_file_is_reread_and_updated() {
    let tree = MockTree::with_files([("a.fb2", fb2("First Title"))]);
    let fx = fixture(tree);
    fx.catalog.build_once().await.unwrap();
    let before = fx.catalog.book_by_file(&physical("a.fb2")).unwrap();

    fx.tree.add_file("a.fb2", fb2("Second Title"));
    let mut events = fx.catalog.subscribe();
    let report = fx.catalog.build_once().await.unwrap();
    assert_eq!(report.indexed, 2);
    assert_eq!(report.created, 0);

    let after = fx.catalog.book_by_file(&physical("a.fb2")).unwrap();
    assert_eq!(after.meta.title, "Second Title");
    assert_eq!(after.id, before.id);
    let events = drain(&mut events);
    assert!(events.contains(&CatalogEvent::Book(BookEventKind::Updated, after.clone())));

    // The refreshed metadata was persisted, not just cached.
    let row = fx.gateway.load_book(before.id.unwrap()).await.unwrap().unwrap();
    assert_eq!(row.meta.title, "Second Title");
}

#[tokio::test]
async fn test_corrupted_in_place_file_keeps_its_row() {
    let tree = MockTree::with_files([("a.fb2", fb2("Alpha"))]);
    let fx = fixture(tree);
    fx.catalog.build_once().await.unwrap();
    let book = fx.catalog.book_by_file(&physical("a.fb2")).unwrap();

    // The file is still present, just no longer parseable.
    fx.tree.add_file("a.fb2", b"no longer xml".to_vec());
    let mut events = fx.catalog.subscribe();
    let report = fx.catalog.build_once().await.unwrap();
    assert_eq!(report.orphaned, 0);
    assert_eq!(report.skipped, vec![(physical("a.fb2"), SkipReason::UnreadableContent)]);
    assert!(fx.catalog.book_by_file(&physical("a.fb2")).is_none());
    let events = drain(&mut events);
    assert!(events.contains(&CatalogEvent::Book(BookEventKind::Removed, book.clone())));

    // The row was never flagged as orphaned and comes straight back once
    // the file parses again.
    assert!(fx.gateway.load_books(false).await.unwrap().is_empty());
    fx.tree.add_file("a.fb2", fb2("Alpha"));
    let report = fx.catalog.build_once().await.unwrap();
    assert_eq!(report.created, 0);
    assert_eq!(report.resurrected, 0);
    assert_eq!(fx.catalog.book_by_file(&physical("a.fb2")).unwrap().id, book.id);
}

#[tokio::test]
async fn test_touched_but_identical_file_emits_nothing() {
    let tree = MockTree::with_files([("a.fb2", fb2("Alpha"))]);
    let fx = fixture(tree);
    fx.catalog.build_once().await.unwrap();

    fx.tree.touch("a.fb2");
    let mut events = fx.catalog.subscribe();
    fx.catalog.build_once().await.unwrap();
    let events = drain(&mut events);
    assert!(events.iter().all(|event| matches!(event, CatalogEvent::Build(_))));
}

#[tokio::test]
async fn test_stale_single_book_container_member_row_is_dropped() {
    let tree = MockTree::with_files([("a.epub", EPUB_MAGIC.to_vec())]);
    let fx = fixture(tree);

    // A row from an older layout that catalogued an entry inside the epub.
    let stale = FileRef::ArchiveEntry {
        archive: PathBuf::from("a.epub"),
        entry: "OEBPS/content.opf".to_string(),
    };
    fx.gateway
        .save_file_ids(&[FileIdRecord {
            file_id: 1,
            file: stale.clone(),
            fingerprint: Fingerprint::new(1, 1),
        }])
        .await
        .unwrap();
    let rows = fx
        .gateway
        .insert_books(&[NewBook {
            file_id: 1,
            file: stale.clone(),
            meta: BookMeta::titled("stale"),
        }])
        .await
        .unwrap();

    let report = fx.catalog.build_once().await.unwrap();
    assert!(report.skipped.contains(&(stale.clone(), SkipReason::StaleArchiveMember)));
    // The stale row is gone for good, not orphaned.
    assert!(fx.gateway.load_book(rows[0].id).await.unwrap().is_none());
    // The epub itself was admitted as the one book it is.
    assert!(fx.catalog.book_by_file(&physical("a.epub")).is_some());
}

#[tokio::test]
async fn test_at_most_one_pass_at_a_time() {
    let tree = MockTree::with_files([("a.fb2", fb2("Alpha"))]);
    let fx = fixture(tree);
    let mut events = fx.catalog.subscribe();

    // On a current-thread runtime the spawned pass cannot run before the
    // first await, so the second request deterministically sees the flag.
    assert!(fx.catalog.start_build());
    assert!(!fx.catalog.start_build());

    let mut seen = Vec::new();
    while let Some(event) = events.recv().await {
        if let CatalogEvent::Build(kind) = event {
            seen.push(kind);
            if kind == BuildEventKind::Completed {
                break;
            }
        }
    }
    assert_eq!(
        seen,
        vec![
            BuildEventKind::NotStarted,
            BuildEventKind::Started,
            BuildEventKind::Succeeded,
            BuildEventKind::Completed,
        ],
    );

    // The flag cleared; an inline pass runs fine now.
    fx.catalog.build_once().await.unwrap();
}

#[tokio::test]
async fn test_inline_pass_rejected_while_building() {
    let tree = MockTree::with_files([("a.fb2", fb2("Alpha"))]);
    let fx = fixture(tree);
    assert!(fx.catalog.start_build());
    let err = fx.catalog.build_once().await.unwrap_err();
    assert!(matches!(&*err, folio_catalog::error::ErrorKind::AlreadyBuilding));
}

#[tokio::test]
async fn test_gateway_failure_reports_failed_but_completes() {
    let tree = MockTree::with_files([("a.fb2", fb2("Alpha"))]);
    let fx = fixture(tree);
    let mut events = fx.catalog.subscribe();

    fx.gateway.fail_writes(true);
    assert!(fx.catalog.build_once().await.is_err());
    let seen: Vec<_> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            CatalogEvent::Build(kind) => Some(kind),
            CatalogEvent::Book(..) => None,
        })
        .collect();
    assert_eq!(seen, vec![BuildEventKind::Started, BuildEventKind::Failed, BuildEventKind::Completed]);

    // The failed pass released the flag and the next one succeeds.
    fx.gateway.fail_writes(false);
    let report = fx.catalog.build_once().await.unwrap();
    assert_eq!(report.created, 2);
}

#[tokio::test]
async fn test_restart_keeps_identities() {
    let tree = MockTree::with_files([("a.fb2", fb2("Alpha"))]);
    let fx = fixture(tree);
    fx.catalog.build_once().await.unwrap();
    let id = fx.catalog.book_by_file(&physical("a.fb2")).unwrap().id;

    // A new catalog over the same gateway and tree, as after a restart.
    let reborn = Catalog::new(fx.gateway.clone(), fx.tree.clone(), Arc::new(FormatReader));
    let report = reborn.build_once().await.unwrap();
    assert_eq!(report.created, 0);
    assert_eq!(report.indexed, 2);
    assert_eq!(reborn.book_by_file(&physical("a.fb2")).unwrap().id, id);
}
