//! File identity cache.
//!
//! Every file reference the catalog has ever seen gets a small numeric id
//! that survives across reconciliation passes; it is the key orphaned rows
//! are resurrected by. Alongside the ids, the set remembers the last-seen
//! fingerprint of each physical file so a pass can decide "re-read or trust
//! the row" without touching file content.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use folio_db::{FileId, FileIdRecord, GatewayHandle};
use folio_vfs::{FileRef, Fingerprint};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Default)]
pub struct FileIdentitySet {
    ids: HashMap<FileRef, FileId>,
    /// Last-seen fingerprints, keyed by physical path. Archive members share
    /// the enclosing archive's entry.
    prints: HashMap<PathBuf, Fingerprint>,
    next: FileId,
}

impl FileIdentitySet {
    /// Rebuild the set from persisted assignments.
    pub fn seed(records: Vec<FileIdRecord>) -> Self {
        let mut set = Self::default();
        for record in records {
            set.next = set.next.max(record.file_id);
            if let Some(path) = record.file.physical_path() {
                set.prints.insert(path.to_path_buf(), record.fingerprint);
            }
            set.ids.insert(record.file, record.file_id);
        }
        set
    }

    /// Recall the id assigned to a file reference, allocating a fresh one on
    /// first sight.
    pub fn id(&mut self, file: &FileRef) -> FileId {
        if let Some(id) = self.ids.get(file) {
            return *id;
        }
        self.next += 1;
        self.ids.insert(file.clone(), self.next);
        self.next
    }

    /// Compare a freshly-stat'ed fingerprint against the last-seen one,
    /// recording the new value. A file with no remembered fingerprint counts
    /// as changed. Builtin references have no physical backing and never
    /// change; archive members delegate to the enclosing archive.
    pub fn changed(&mut self, file: &FileRef, current: Fingerprint) -> bool {
        let Some(path) = file.physical_path() else {
            return false;
        };
        match self.prints.insert(path.to_path_buf(), current) {
            Some(previous) => previous != current,
            None => true,
        }
    }

    /// Flush all assignments through the gateway. Must complete before the
    /// new-book batch is written, so the file ids those rows reference are
    /// durable first.
    pub async fn persist(&self, gateway: &GatewayHandle) -> Result<()> {
        let records: Vec<FileIdRecord> = self
            .ids
            .iter()
            .map(|(file, &file_id)| FileIdRecord {
                file_id,
                file: file.clone(),
                fingerprint: file
                    .physical_path()
                    .and_then(|path| self.prints.get(path))
                    .copied()
                    .unwrap_or(Fingerprint::new(0, 0)),
            })
            .collect();
        gateway.save_file_ids(&records).await.or_raise(|| ErrorKind::Gateway)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_db::{Gateway, MemoryGateway};
    use std::sync::Arc;

    fn physical(path: &str) -> FileRef {
        FileRef::Physical(PathBuf::from(path))
    }

    fn member(archive: &str, entry: &str) -> FileRef {
        FileRef::ArchiveEntry {
            archive: PathBuf::from(archive),
            entry: entry.to_string(),
        }
    }

    #[test]
    fn test_ids_are_stable_and_sequential() {
        let mut set = FileIdentitySet::default();
        let a = set.id(&physical("a.epub"));
        let b = set.id(&physical("b.fb2"));
        assert_ne!(a, b);
        assert_eq!(set.id(&physical("a.epub")), a);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_seed_allocates_above_persisted_ids() {
        let records = vec![FileIdRecord {
            file_id: 41,
            file: physical("a.epub"),
            fingerprint: Fingerprint::new(1, 1),
        }];
        let mut set = FileIdentitySet::seed(records);
        assert_eq!(set.id(&physical("a.epub")), 41);
        assert_eq!(set.id(&physical("b.fb2")), 42);
    }

    #[test]
    fn test_changed_tracks_last_seen_fingerprint() {
        let mut set = FileIdentitySet::default();
        let file = physical("a.epub");
        // Never seen: changed, and the print is recorded.
        assert!(set.changed(&file, Fingerprint::new(10, 100)));
        assert!(!set.changed(&file, Fingerprint::new(10, 100)));
        assert!(set.changed(&file, Fingerprint::new(10, 101)));
    }

    #[test]
    fn test_members_share_the_archive_fingerprint() {
        let mut set = FileIdentitySet::default();
        assert!(set.changed(&member("bundle.zip", "c.fb2"), Fingerprint::new(10, 100)));
        // Same archive, different member: already seen.
        assert!(!set.changed(&member("bundle.zip", "d.fb2"), Fingerprint::new(10, 100)));
        assert!(!set.changed(&physical("bundle.zip"), Fingerprint::new(10, 100)));
    }

    #[test]
    fn test_builtin_never_changes() {
        let mut set = FileIdentitySet::default();
        let help = FileRef::Builtin("help/intro.fb2".to_string());
        assert!(!set.changed(&help, Fingerprint::new(0, 0)));
    }

    #[tokio::test]
    async fn test_persist_round_trips_through_gateway() {
        let gateway: GatewayHandle = Arc::new(MemoryGateway::new());
        let mut set = FileIdentitySet::default();
        let file = physical("a.epub");
        let id = set.id(&file);
        set.changed(&file, Fingerprint::new(7, 70));
        set.id(&FileRef::Builtin("help/intro.fb2".to_string()));
        set.persist(&gateway).await.unwrap();

        let mut reloaded = FileIdentitySet::seed(gateway.load_file_ids().await.unwrap());
        assert_eq!(reloaded.id(&file), id);
        assert!(!reloaded.changed(&file, Fingerprint::new(7, 70)));
    }
}
