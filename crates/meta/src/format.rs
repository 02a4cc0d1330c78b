//! Book format detection.

use std::fmt;

/// Book formats the catalog recognizes.
///
/// Detection is two-stage: the extension nominates a format, then the first
/// bytes of content must agree ([`Format::matches_magic`]). Archive
/// containers (`.zip`, `.cbz`) are deliberately *not* formats; the
/// reconciliation pass descends into them instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// EPUB: a zip container holding exactly one book.
    Epub,
    /// FictionBook 2 XML.
    Fb2,
    /// Plain text.
    Txt,
}

impl Format {
    /// Nominate a format from a file name. `None` for anything unknown.
    pub fn from_name(name: &str) -> Option<Self> {
        let extension = name.rsplit_once('.').map(|(_, ext)| ext)?;
        match extension.to_ascii_lowercase().as_str() {
            "epub" => Some(Self::Epub),
            "fb2" => Some(Self::Fb2),
            "txt" => Some(Self::Txt),
            _ => None,
        }
    }

    /// Check the first bytes of content against the nominated format.
    pub fn matches_magic(self, head: &[u8]) -> bool {
        match self {
            // Zip local file header; empty/truncated epubs fail here.
            Self::Epub => head.starts_with(b"PK\x03\x04"),
            // FB2 is XML; accept a BOM or leading whitespace before the
            // declaration, but the document element must be FictionBook.
            Self::Fb2 => {
                let text = String::from_utf8_lossy(&head[..head.len().min(512)]);
                text.contains("<FictionBook")
            },
            Self::Txt => !head.is_empty() && std::str::from_utf8(head).is_ok(),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Epub => "epub",
            Self::Fb2 => "fb2",
            Self::Txt => "txt",
        };
        write!(f, "{name}")
    }
}
