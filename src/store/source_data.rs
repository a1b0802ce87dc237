//! Source data store
//!
//! Per-source attributes keyed by file hash:
//! `varint(filesize) ‖ varint(nonprobative_count) ‖ varint(len) ‖
//! file_type`. New fields may be appended in the future; decoders must
//! consume exactly what they know about.

use crate::changes::Changes;
use crate::codec::{decode_varint, encode_varint};
use crate::error::{DbError, Result};
use crate::store::engine::{FlatStore, OpenMode};
use std::path::Path;

/// Attributes of one source file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceData {
    pub filesize: u64,
    pub file_type: String,
    pub nonprobative_count: u64,
}

impl SourceData {
    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_varint(&mut buf, self.filesize);
        encode_varint(&mut buf, self.nonprobative_count);
        encode_varint(&mut buf, self.file_type.len() as u64);
        buf.extend_from_slice(self.file_type.as_bytes());
        buf
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut pos = 0;
        let filesize = decode_varint(bytes, &mut pos)?;
        let nonprobative_count = decode_varint(bytes, &mut pos)?;
        let len = decode_varint(bytes, &mut pos)? as usize;
        let end = pos
            .checked_add(len)
            .filter(|&e| e <= bytes.len())
            .ok_or_else(|| DbError::corrupt("file type overruns source data record"))?;
        let file_type = std::str::from_utf8(&bytes[pos..end])
            .map_err(|_| DbError::corrupt("file type is not UTF-8"))?
            .to_string();
        Ok(Self {
            filesize,
            file_type,
            nonprobative_count,
        })
    }
}

pub struct SourceDataStore {
    store: FlatStore,
}

impl SourceDataStore {
    pub fn open(path: &Path, mode: OpenMode) -> Result<Self> {
        Ok(Self {
            store: FlatStore::open(path, mode)?,
        })
    }

    /// Insert or update the attributes of a source. An identical tuple
    /// is a no-op; a differing tuple overwrites.
    ///
    /// Callers must hold the database write lock.
    pub fn insert(&self, file_hash: &[u8], data: &SourceData, changes: &mut Changes) -> Result<()> {
        assert!(!file_hash.is_empty(), "empty file hash");

        match self.store.get(file_hash)? {
            None => {
                self.store.put(file_hash, &data.encode())?;
                changes.source_data_inserted += 1;
            }
            Some(existing) => {
                if SourceData::decode(&existing)? == *data {
                    changes.source_data_same += 1;
                } else {
                    self.store.put(file_hash, &data.encode())?;
                    changes.source_data_changed += 1;
                }
            }
        }
        Ok(())
    }

    pub fn find(&self, file_hash: &[u8]) -> Result<Option<SourceData>> {
        assert!(!file_hash.is_empty(), "empty file hash");
        match self.store.get(file_hash)? {
            Some(bytes) => Ok(Some(SourceData::decode(&bytes)?)),
            None => Ok(None),
        }
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
    fn test_insert_find_roundtrip() {
        let dir = tempdir().unwrap();
        let store = SourceDataStore::open(dir.path(), OpenMode::Create).unwrap();
        let mut changes = Changes::new();

        let data = SourceData {
            filesize: 800,
            file_type: "exe".to_string(),
            nonprobative_count: 2,
        };
        store.insert(b"\x01\x01", &data, &mut changes).unwrap();
        assert_eq!(changes.source_data_inserted, 1);
        assert_eq!(store.find(b"\x01\x01").unwrap().unwrap(), data);
        assert_eq!(store.find(b"\x02\x02").unwrap(), None);
    }

    #[test]
    fn test_same_tuple_is_noop_changed_overwrites() {
        let dir = tempdir().unwrap();
        let store = SourceDataStore::open(dir.path(), OpenMode::Create).unwrap();
        let mut changes = Changes::new();

        let data = SourceData {
            filesize: 800,
            file_type: "exe".to_string(),
            nonprobative_count: 2,
        };
        store.insert(b"\x01\x01", &data, &mut changes).unwrap();
        store.insert(b"\x01\x01", &data, &mut changes).unwrap();
        assert_eq!(changes.source_data_same, 1);

        let updated = SourceData {
            filesize: 900,
            ..data
        };
        store.insert(b"\x01\x01", &updated, &mut changes).unwrap();
        assert_eq!(changes.source_data_changed, 1);
        assert_eq!(store.find(b"\x01\x01").unwrap().unwrap(), updated);
    }
}
