//! Source name store
//!
//! Maps a source id to the set of (repository name, filename) pairs the
//! source has been seen under. Keyed by varint(source id); each record is
//! `repository_name ‖ 0x00 ‖ filename` with set semantics.

use crate::changes::Changes;
use crate::codec::{decode_string_pair, encode_string_pair, encode_varint};
use crate::error::Result;
use crate::store::engine::{DupStore, OpenMode, PutOutcome};
use std::path::Path;

pub struct SourceNameStore {
    store: DupStore,
}

impl SourceNameStore {
    pub fn open(path: &Path, mode: OpenMode) -> Result<Self> {
        Ok(Self {
            store: DupStore::open(path, mode)?,
        })
    }

    fn key(source_id: u64) -> Vec<u8> {
        let mut key = Vec::new();
        encode_varint(&mut key, source_id);
        key
    }

    /// Add one name pair for a source. Re-inserting an existing pair is
    /// a no-op.
    ///
    /// Callers must hold the database write lock.
    pub fn insert(
        &self,
        source_id: u64,
        repository_name: &str,
        filename: &str,
        changes: &mut Changes,
    ) -> Result<()> {
        assert!(source_id != 0, "source id 0 is reserved");

        let record = encode_string_pair(repository_name, filename);
        match self.store.put_no_dup(&Self::key(source_id), &record)? {
            PutOutcome::Inserted => changes.source_name_inserted += 1,
            PutOutcome::AlreadyPresent => changes.source_name_already_present += 1,
        }
        Ok(())
    }

    /// All (repository name, filename) pairs for a source, in record
    /// byte order
    pub fn find(&self, source_id: u64) -> Result<Vec<(String, String)>> {
        assert!(source_id != 0, "source id 0 is reserved");

        let mut names = Vec::new();
        for record in self.store.records(&Self::key(source_id))? {
            names.push(decode_string_pair(&record)?);
        }
        Ok(names)
    }

    pub fn record_count(&self) -> Result<u64> {
        self.store.record_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_set_semantics() {
        let dir = tempdir().unwrap();
        let store = SourceNameStore::open(dir.path(), OpenMode::Create).unwrap();
        let mut changes = Changes::new();

        store.insert(1, "repo1", "a.dat", &mut changes).unwrap();
        store.insert(1, "repo2", "b.dat", &mut changes).unwrap();
        store.insert(1, "repo1", "a.dat", &mut changes).unwrap();
        assert_eq!(changes.source_name_inserted, 2);
        assert_eq!(changes.source_name_already_present, 1);

        let names = store.find(1).unwrap();
        assert_eq!(
            names,
            vec![
                ("repo1".to_string(), "a.dat".to_string()),
                ("repo2".to_string(), "b.dat".to_string()),
            ]
        );
        assert!(store.find(2).unwrap().is_empty());
    }

    #[test]
    fn test_sources_are_separate() {
        let dir = tempdir().unwrap();
        let store = SourceNameStore::open(dir.path(), OpenMode::Create).unwrap();
        let mut changes = Changes::new();

        store.insert(1, "repo", "one", &mut changes).unwrap();
        store.insert(2, "repo", "two", &mut changes).unwrap();

        assert_eq!(store.find(1).unwrap().len(), 1);
        assert_eq!(store.find(2).unwrap().len(), 1);
        assert_eq!(store.record_count().unwrap(), 2);
    }
}
