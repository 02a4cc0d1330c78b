//! The `MetaReader` seam and its implementations.

use crate::error::{ErrorKind, Result};
use crate::format::Format;
use crate::models::BookMeta;
use async_trait::async_trait;
use exn::ResultExt;
use folio_vfs::{FileRef, TreeHandle};

/// Reads display metadata for a file reference.
///
/// This is the only contact the catalog has with book content. Implementors
/// must fail with an [`Unsupported`](ErrorKind::Unsupported) or
/// [`Unreadable`](ErrorKind::Unreadable) kind for anything that is not a
/// parseable book; the reconciliation pass skips those files and moves on.
#[async_trait]
pub trait MetaReader: Send + Sync {
    async fn read(&self, tree: &TreeHandle, file: &FileRef) -> Result<BookMeta>;
}

/// Extract metadata from raw content, with the format nominated by the file
/// name and confirmed by magic bytes.
pub fn extract(name: &str, bytes: &[u8]) -> Result<BookMeta> {
    let Some(format) = Format::from_name(name) else {
        exn::bail!(ErrorKind::Unsupported(name.to_string()));
    };
    if !format.matches_magic(bytes) {
        exn::bail!(ErrorKind::Unreadable(name.to_string()));
    }
    let mut meta = match format {
        Format::Fb2 => fb2_meta(bytes),
        // Epub display metadata lives inside the container; opening it is
        // the reading view's job, not the shelf's. Title from the file name.
        Format::Epub | Format::Txt => None,
    }
    .unwrap_or_else(|| BookMeta::titled(title_from_name(name)));
    if meta.title.trim().is_empty() {
        meta.title = title_from_name(name);
    }
    Ok(meta)
}

fn title_from_name(name: &str) -> String {
    let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
    stem.replace(['_', '+'], " ").trim().to_string()
}

/// Best-effort FB2 description scan. FB2 is XML, but the handful of fields
/// the shelf shows sit in fixed, unnamespaced elements near the top of the
/// file; simple tag scanning covers real-world files without an XML stack.
fn fb2_meta(bytes: &[u8]) -> Option<BookMeta> {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(8 * 1024)]);
    let description = head.split("</description>").next()?;
    let title = tag_text(description, "book-title")?;
    let authors = author_names(description);
    Some(BookMeta {
        title,
        authors,
        language: tag_text(description, "lang"),
        series: attr_value(description, "sequence", "name"),
        tags: tag_texts(description, "genre"),
    })
}

fn tag_text(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    let text = xml[start..end].trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn tag_texts(xml: &str, tag: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut rest = xml;
    while let Some(text) = tag_text(rest, tag) {
        let close = format!("</{tag}>");
        let Some(offset) = rest.find(&close) else { break };
        rest = &rest[offset + close.len()..];
        found.push(text);
    }
    found
}

fn attr_value(xml: &str, tag: &str, attr: &str) -> Option<String> {
    let start = xml.find(&format!("<{tag} "))?;
    let element = &xml[start..xml[start..].find('>')? + start];
    let marker = format!("{attr}=\"");
    let value_start = element.find(&marker)? + marker.len();
    let value_end = element[value_start..].find('"')? + value_start;
    let value = element[value_start..value_end].trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn author_names(description: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = description;
    while let Some(start) = rest.find("<author>") {
        let Some(end) = rest[start..].find("</author>") else { break };
        let author = &rest[start..start + end];
        let name = [tag_text(author, "first-name"), tag_text(author, "middle-name"), tag_text(author, "last-name")]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        if !name.is_empty() {
            names.push(name);
        }
        rest = &rest[start + end..];
    }
    names
}

/// Format-sniffing [`MetaReader`] over a file tree.
#[derive(Debug, Default, Clone, Copy)]
pub struct FormatReader;

#[async_trait]
impl MetaReader for FormatReader {
    async fn read(&self, tree: &TreeHandle, file: &FileRef) -> Result<BookMeta> {
        let bytes = tree.read(file).await.or_raise(|| ErrorKind::Storage)?;
        let meta = extract(file.name(), &bytes)?;
        tracing::trace!(file = %file, title = %meta.title, "extracted metadata");
        Ok(meta)
    }
}

#[cfg(feature = "mock")]
mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    enum Script {
        Meta(BookMeta),
        Corrupt,
    }

    /// Scripted [`MetaReader`] for tests.
    ///
    /// Unscripted files resolve to a title derived from the file name, so
    /// most fixtures need no setup. Every read is recorded, letting tests
    /// assert that unchanged files were *not* re-read.
    #[derive(Default)]
    pub struct MockReader {
        scripts: Mutex<HashMap<FileRef, Script>>,
        reads: Mutex<Vec<FileRef>>,
    }

    impl MockReader {
        pub fn new() -> Self {
            Self::default()
        }

        /// Script a successful read with explicit metadata.
        pub fn ok(self, file: FileRef, meta: BookMeta) -> Self {
            self.scripts.lock().unwrap().insert(file, Script::Meta(meta));
            self
        }

        /// Script a read that fails as unreadable content.
        pub fn corrupt(self, file: FileRef) -> Self {
            self.scripts.lock().unwrap().insert(file, Script::Corrupt);
            self
        }

        /// Every file reference read so far, in order.
        pub fn reads(&self) -> Vec<FileRef> {
            self.reads.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MetaReader for MockReader {
        async fn read(&self, _tree: &TreeHandle, file: &FileRef) -> Result<BookMeta> {
            self.reads.lock().unwrap().push(file.clone());
            match self.scripts.lock().unwrap().get(file) {
                Some(Script::Meta(meta)) => Ok(meta.clone()),
                Some(Script::Corrupt) => exn::bail!(ErrorKind::Unreadable(file.to_string())),
                None => Ok(BookMeta::titled(super::title_from_name(file.name()))),
            }
        }
    }
}

#[cfg(feature = "mock")]
pub use self::mock::MockReader;

#[cfg(test)]
mod tests {
    use super::*;
    use folio_vfs::tree::MockTree;
    use std::path::PathBuf;
    use std::sync::Arc;

    const FB2: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<FictionBook xmlns="http://www.gribuser.ru/xml/fictionbook/2.0">
  <description>
    <title-info>
      <genre>sf</genre>
      <genre>adventure</genre>
      <author><first-name>Jules</first-name><last-name>Verne</last-name></author>
      <book-title>Around the Moon</book-title>
      <lang>en</lang>
      <sequence name="Baltimore Gun Club" number="2"/>
    </title-info>
  </description>
  <body/>
</FictionBook>"#;

    #[test]
    fn test_extract_fb2_description() {
        let meta = extract("moon.fb2", FB2.as_bytes()).unwrap();
        assert_eq!(meta.title, "Around the Moon");
        assert_eq!(meta.authors, vec!["Jules Verne"]);
        assert_eq!(meta.language.as_deref(), Some("en"));
        assert_eq!(meta.series.as_deref(), Some("Baltimore Gun Club"));
        assert_eq!(meta.tags, vec!["sf", "adventure"]);
    }

    #[test]
    fn test_extract_epub_title_from_name() {
        let meta = extract("the_time_machine.epub", b"PK\x03\x04rest").unwrap();
        assert_eq!(meta.title, "the time machine");
        assert!(meta.authors.is_empty());
    }

    #[test]
    fn test_extract_rejects_unknown_extension() {
        let err = extract("document.pdf", b"%PDF-1.4").unwrap_err();
        assert!(matches!(&*err, ErrorKind::Unsupported(_)));
    }

    #[test]
    fn test_extract_rejects_bad_magic() {
        let err = extract("broken.epub", b"not a zip at all").unwrap_err();
        assert!(matches!(&*err, ErrorKind::Unreadable(_)));
        let err = extract("broken.fb2", b"<html>nope</html>").unwrap_err();
        assert!(matches!(&*err, ErrorKind::Unreadable(_)));
    }

    #[test]
    fn test_fb2_without_title_falls_back_to_name() {
        let bytes = b"<FictionBook><description></description></FictionBook>";
        let meta = extract("untitled_draft.fb2", bytes).unwrap();
        assert_eq!(meta.title, "untitled draft");
    }

    #[tokio::test]
    async fn test_format_reader_through_tree() {
        let tree = MockTree::with_files([("moon.fb2", FB2.as_bytes().to_vec())]);
        let handle: TreeHandle = Arc::new(tree);
        let reader = FormatReader;
        let meta = reader.read(&handle, &FileRef::Physical(PathBuf::from("moon.fb2"))).await.unwrap();
        assert_eq!(meta.title, "Around the Moon");
    }

    #[tokio::test]
    async fn test_format_reader_archive_member() {
        let tree = MockTree::new();
        tree.add_archive("bundle.zip", [("moon.fb2", FB2.as_bytes().to_vec())]);
        let handle: TreeHandle = Arc::new(tree);
        let member = FileRef::ArchiveEntry {
            archive: PathBuf::from("bundle.zip"),
            entry: "moon.fb2".to_string(),
        };
        let meta = FormatReader.read(&handle, &member).await.unwrap();
        assert_eq!(meta.title, "Around the Moon");
    }
}
