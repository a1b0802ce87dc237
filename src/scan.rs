//! Scan manager
//!
//! The read-side façade. Opens read-only handles on all five stores and
//! joins them on lookup: the hash index shortcuts definite misses, the
//! hash data store supplies metadata and references, and the source
//! stores expand source ids into file hashes, attributes, and names.
//!
//! `find_expanded_hash` memoizes per manager instance: a hash expands
//! once, a source's details are emitted once. Consumers sharing one
//! instance across threads must serialize those calls themselves.

use crate::codec::bin_to_hex;
use crate::error::Result;
use crate::settings::{read_settings, Settings};
use crate::store::{
    HashDataStore, HashIndexStore, OpenMode, SourceData, SourceDataStore, SourceIdStore,
    SourceNameStore, HASH_DATA_STORE_DIR, HASH_STORE_DIR, SOURCE_DATA_STORE_DIR,
    SOURCE_ID_STORE_DIR, SOURCE_NAME_STORE_DIR,
};
use gxhash::GxHasher;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::hash::Hasher;
use std::path::Path;

/// Metadata and file-hash-resolved references of one matched hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashMatch {
    pub entropy: u64,
    pub block_label: String,
    /// (file hash, file offset) pairs, ordered
    pub pairs: BTreeSet<(Vec<u8>, u64)>,
}

/// One source entry of an expanded hash
#[derive(Serialize)]
struct ExpandedSource {
    file_hash: String,
    filesize: u64,
    file_type: String,
    nonprobative_count: u64,
    /// Alternating repository name, filename
    names: Vec<String>,
}

/// JSON shape of an expanded hash
#[derive(Serialize)]
struct ExpandedHash {
    entropy: u64,
    block_label: String,
    source_list_id: u64,
    sources: Vec<ExpandedSource>,
    /// Alternating file hash hex, file offset
    source_offset_pairs: Vec<serde_json::Value>,
}

/// Read-side façade over one database
pub struct ScanManager {
    settings: Settings,
    hash_data: HashDataStore,
    hash_index: HashIndexStore,
    source_id: SourceIdStore,
    source_data: SourceDataStore,
    source_name: SourceNameStore,
    seen_hashes: Mutex<HashSet<Vec<u8>>>,
    seen_sources: Mutex<HashSet<Vec<u8>>>,
}

impl ScanManager {
    /// Open an existing database for scanning
    pub fn open(db_dir: &Path) -> Result<Self> {
        let settings = read_settings(db_dir)?;
        Ok(Self {
            hash_data: HashDataStore::open(
                &db_dir.join(HASH_DATA_STORE_DIR),
                OpenMode::ReadOnly,
                settings.sector_size,
                settings.max_source_offset_pairs,
            )?,
            hash_index: HashIndexStore::open(
                &db_dir.join(HASH_STORE_DIR),
                OpenMode::ReadOnly,
                settings.hash_prefix_bits,
                settings.hash_suffix_bytes,
            )?,
            source_id: SourceIdStore::open(&db_dir.join(SOURCE_ID_STORE_DIR), OpenMode::ReadOnly)?,
            source_data: SourceDataStore::open(
                &db_dir.join(SOURCE_DATA_STORE_DIR),
                OpenMode::ReadOnly,
            )?,
            source_name: SourceNameStore::open(
                &db_dir.join(SOURCE_NAME_STORE_DIR),
                OpenMode::ReadOnly,
            )?,
            settings,
            seen_hashes: Mutex::new(HashSet::new()),
            seen_sources: Mutex::new(HashSet::new()),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Find a hash and resolve its references to file hashes
    pub fn find_hash(&self, hash: &[u8]) -> Result<Option<HashMatch>> {
        // the index answers definite misses without touching hash data
        if !self.hash_index.maybe_present(hash)? {
            return Ok(None);
        }
        let Some(record) = self.hash_data.find(hash)? else {
            return Ok(None);
        };

        let mut pairs = BTreeSet::new();
        for (source_id, file_offset) in &record.pairs {
            let file_hash = self.source_id.find_file_hash(*source_id)?;
            pairs.insert((file_hash, *file_offset));
        }
        Ok(Some(HashMatch {
            entropy: record.entropy,
            block_label: record.block_label,
            pairs,
        }))
    }

    /// Reference count of a hash; 0 when absent
    pub fn find_hash_count(&self, hash: &[u8]) -> Result<u64> {
        self.hash_data.find_count(hash)
    }

    /// Attributes of a source, or None when the file hash is unknown
    pub fn find_source_data(&self, file_hash: &[u8]) -> Result<Option<SourceData>> {
        if self.source_id.find_id(file_hash)?.is_none() {
            return Ok(None);
        }
        self.source_data.find(file_hash)
    }

    /// Name pairs of a source, or None when the file hash is unknown
    pub fn find_source_names(&self, file_hash: &[u8]) -> Result<Option<Vec<(String, String)>>> {
        match self.source_id.find_id(file_hash)? {
            Some(source_id) => Ok(Some(self.source_name.find(source_id)?)),
            None => Ok(None),
        }
    }

    /// Smallest hash in the database
    pub fn hash_begin(&self) -> Result<Option<Vec<u8>>> {
        self.hash_data.first_hash()
    }

    /// Hash following `last_hash`. `last_hash` must exist.
    pub fn hash_next(&self, last_hash: &[u8]) -> Result<Option<Vec<u8>>> {
        self.hash_data.next_hash(last_hash)
    }

    /// Smallest source file hash in the database
    pub fn source_begin(&self) -> Result<Option<Vec<u8>>> {
        self.source_id.first_source()
    }

    /// Source file hash following `last`. `last` must exist.
    pub fn source_next(&self, last: &[u8]) -> Result<Option<Vec<u8>>> {
        self.source_id.next_source(last)
    }

    /// Expand a hash into JSON with source details.
    ///
    /// Returns None on a miss. On a hit, the first expansion of a hash
    /// carries the full record; later expansions of the same hash on this
    /// manager instance return the empty string, and sources already
    /// emitted are omitted from `sources` while their offset pairs
    /// remain.
    pub fn find_expanded_hash(&self, hash: &[u8]) -> Result<Option<String>> {
        let Some(matched) = self.find_hash(hash)? else {
            return Ok(None);
        };

        // already expanded on this instance
        if !self.seen_hashes.lock().insert(hash.to_vec()) {
            return Ok(Some(String::new()));
        }

        // distinct file hashes, sorted
        let distinct: BTreeSet<Vec<u8>> =
            matched.pairs.iter().map(|(fh, _)| fh.clone()).collect();

        // stable id of the source set
        let mut hasher = GxHasher::with_seed(0);
        for file_hash in &distinct {
            hasher.write(file_hash);
        }
        let source_list_id = hasher.finish();

        let mut sources = Vec::new();
        {
            let mut seen_sources = self.seen_sources.lock();
            for file_hash in &distinct {
                if !seen_sources.insert(file_hash.clone()) {
                    continue;
                }
                let data = self.find_source_data(file_hash)?.unwrap_or_default();
                let mut names = Vec::new();
                for (repository_name, filename) in
                    self.find_source_names(file_hash)?.unwrap_or_default()
                {
                    names.push(repository_name);
                    names.push(filename);
                }
                sources.push(ExpandedSource {
                    file_hash: bin_to_hex(file_hash),
                    filesize: data.filesize,
                    file_type: data.file_type,
                    nonprobative_count: data.nonprobative_count,
                    names,
                });
            }
        }

        let mut source_offset_pairs = Vec::new();
        for (file_hash, file_offset) in &matched.pairs {
            source_offset_pairs.push(serde_json::Value::from(bin_to_hex(file_hash)));
            source_offset_pairs.push(serde_json::Value::from(*file_offset));
        }

        let expanded = ExpandedHash {
            entropy: matched.entropy,
            block_label: matched.block_label,
            source_list_id,
            sources,
            source_offset_pairs,
        };
        Ok(Some(serde_json::to_string(&expanded)?))
    }

    /// Per-store record counts as a JSON line
    pub fn sizes(&self) -> Result<String> {
        Ok(format!(
            "{{\"hash_data_store\":{}, \"hash_store\":{}, \"source_data_store\":{}, \"source_id_store\":{}, \"source_name_store\":{}}}",
            self.hash_data.record_count()?,
            self.hash_index.record_count()?,
            self.source_data.record_count()?,
            self.source_id.source_count()?,
            self.source_name.record_count()?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::{create_database, ImportManager};
    use crate::settings::Settings;
    use tempfile::tempdir;

    fn build_db(dir: &Path) -> std::path::PathBuf {
        let db = dir.join("db");
        create_database(&db, &Settings::default(), "test create").unwrap();
        let manager = ImportManager::open(&db, "test import").unwrap();
        manager
            .insert_source_data(
                b"\x01\x01",
                &SourceData {
                    filesize: 800,
                    file_type: "exe".to_string(),
                    nonprobative_count: 2,
                },
            )
            .unwrap();
        manager
            .insert_source_name(b"\x01\x01", "repo1", "file1")
            .unwrap();
        manager
            .insert_hash(b"\xaa\xaa", b"\x01\x01", 0, 7, "W")
            .unwrap();
        manager
            .insert_hash(b"\xaa\xaa", b"\x02\x02", 512, 7, "W")
            .unwrap();
        manager.finish().unwrap();
        db
    }

    #[test]
    fn test_find_hash_resolves_file_hashes() {
        let dir = tempdir().unwrap();
        let db = build_db(dir.path());
        let scan = ScanManager::open(&db).unwrap();

        let matched = scan.find_hash(b"\xaa\xaa").unwrap().unwrap();
        assert_eq!(matched.entropy, 7);
        assert_eq!(matched.block_label, "W");
        let pairs: Vec<_> = matched.pairs.iter().cloned().collect();
        assert_eq!(
            pairs,
            vec![(b"\x01\x01".to_vec(), 0), (b"\x02\x02".to_vec(), 512)]
        );

        assert_eq!(scan.find_hash(b"\xbb\xbb").unwrap(), None);
        assert_eq!(scan.find_hash_count(b"\xaa\xaa").unwrap(), 2);
        assert_eq!(scan.find_hash_count(b"\xbb\xbb").unwrap(), 0);
    }

    #[test]
    fn test_find_source_data_and_names() {
        let dir = tempdir().unwrap();
        let db = build_db(dir.path());
        let scan = ScanManager::open(&db).unwrap();

        let data = scan.find_source_data(b"\x01\x01").unwrap().unwrap();
        assert_eq!(data.filesize, 800);
        assert_eq!(data.file_type, "exe");

        let names = scan.find_source_names(b"\x01\x01").unwrap().unwrap();
        assert_eq!(names, vec![("repo1".to_string(), "file1".to_string())]);

        assert_eq!(scan.find_source_data(b"\x09\x09").unwrap(), None);
        assert!(scan.find_source_names(b"\x09\x09").unwrap().is_none());
    }

    #[test]
    fn test_expanded_hash_shape_and_memoization() {
        let dir = tempdir().unwrap();
        let db = build_db(dir.path());
        let scan = ScanManager::open(&db).unwrap();

        let text = scan.find_expanded_hash(b"\xaa\xaa").unwrap().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["entropy"], 7);
        assert_eq!(parsed["block_label"], "W");
        assert!(parsed["source_list_id"].is_u64());
        assert_eq!(parsed["sources"].as_array().unwrap().len(), 2);
        assert_eq!(parsed["sources"][0]["file_hash"], "0101");
        assert_eq!(parsed["sources"][0]["filesize"], 800);
        assert_eq!(
            parsed["sources"][0]["names"],
            serde_json::json!(["repo1", "file1"])
        );
        assert_eq!(
            parsed["source_offset_pairs"],
            serde_json::json!(["0101", 0, "0202", 512])
        );

        // second expansion of the same hash is suppressed
        let again = scan.find_expanded_hash(b"\xaa\xaa").unwrap().unwrap();
        assert_eq!(again, "");

        // a miss stays None
        assert_eq!(scan.find_expanded_hash(b"\xbb\xbb").unwrap(), None);
    }

    #[test]
    fn test_expanded_hash_omits_seen_sources() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("db");
        create_database(&db, &Settings::default(), "test create").unwrap();
        let manager = ImportManager::open(&db, "test import").unwrap();
        // two hashes share source 0x0101
        manager
            .insert_hash(b"\xaa\xaa", b"\x01\x01", 0, 0, "")
            .unwrap();
        manager
            .insert_hash(b"\xbb\xbb", b"\x01\x01", 512, 0, "")
            .unwrap();
        manager.finish().unwrap();

        let scan = ScanManager::open(&db).unwrap();
        let first = scan.find_expanded_hash(b"\xaa\xaa").unwrap().unwrap();
        let second = scan.find_expanded_hash(b"\xbb\xbb").unwrap().unwrap();

        let first: serde_json::Value = serde_json::from_str(&first).unwrap();
        let second: serde_json::Value = serde_json::from_str(&second).unwrap();
        assert_eq!(first["sources"].as_array().unwrap().len(), 1);
        // source already emitted, but the offset pair remains
        assert_eq!(second["sources"].as_array().unwrap().len(), 0);
        assert_eq!(
            second["source_offset_pairs"],
            serde_json::json!(["0101", 512])
        );
    }

    #[test]
    fn test_hash_and_source_cursors() {
        let dir = tempdir().unwrap();
        let db = build_db(dir.path());
        let scan = ScanManager::open(&db).unwrap();

        let first = scan.hash_begin().unwrap().unwrap();
        assert_eq!(first, b"\xaa\xaa");
        assert_eq!(scan.hash_next(&first).unwrap(), None);

        let first = scan.source_begin().unwrap().unwrap();
        assert_eq!(first, b"\x01\x01");
        let second = scan.source_next(&first).unwrap().unwrap();
        assert_eq!(second, b"\x02\x02");
        assert_eq!(scan.source_next(&second).unwrap(), None);
    }
}
