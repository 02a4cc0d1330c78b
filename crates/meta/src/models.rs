//! Display metadata for a book.

use serde::{Deserialize, Serialize};

/// Lazily-loaded display metadata.
///
/// Everything the shelf UI needs to render an entry; nothing the reading
/// view needs. Serialized into persisted catalog rows by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookMeta {
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub series: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl BookMeta {
    /// Minimal metadata with just a title.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            authors: Vec::new(),
            language: None,
            series: None,
            tags: Vec::new(),
        }
    }
}
