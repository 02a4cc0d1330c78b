use derive_more::Display;
use folio_vfs::FileRef;

/// Why a file visited during a reconciliation pass did not become a book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SkipReason {
    /// The file name nominates no known book format.
    #[display("unsupported format")]
    UnsupportedFormat,
    /// The format was recognized but the content does not parse as one.
    #[display("unreadable content")]
    UnreadableContent,
    /// The file (or enclosing archive) could not be read at all.
    #[display("inaccessible")]
    Inaccessible,
    /// A persisted row pointing inside a single-book container; an artifact
    /// of an older cataloguing layout, dropped rather than resurrected.
    #[display("stale archive member row")]
    StaleArchiveMember,
}

/// Outcome summary of one reconciliation pass.
///
/// Per-file problems never abort a pass; they end up in `skipped` (and in
/// the log, at the point of occurrence) instead.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BuildReport {
    /// Previously-catalogued books confirmed live (unchanged or refreshed).
    pub indexed: usize,
    /// Books discovered this pass and written as new rows.
    pub created: usize,
    /// Orphaned rows whose file identity reappeared, revived under their
    /// original id.
    pub resurrected: usize,
    /// Rows whose backing file vanished this pass.
    pub orphaned: usize,
    /// Files visited but not admitted, with the reason.
    pub skipped: Vec<(FileRef, SkipReason)>,
}
