//! Hash data store
//!
//! Maps a block hash to its metadata (entropy, block label) and a capped
//! set of (source id, file offset) references. Three record shapes share
//! one key:
//!
//! - A `Single` record carries everything while a hash has exactly one
//!   reference: `varint(source_id) ‖ varint(offset_index) ‖
//!   varint(entropy) ‖ varint(label_len) ‖ label`.
//! - Once a second reference arrives, the hash is rewritten as one `Meta`
//!   record (`0x00 ‖ varint(entropy) ‖ varint(label_len) ‖ label`)
//!   followed by one `SourceRef` record per reference
//!   (`varint(source_id) ‖ varint(offset_index)`).
//!
//! Source ids must be >= 1: a varint of a positive value never starts
//! with 0x00, so the first byte of the first record under a key
//! distinguishes the two regimes, and the `Meta` record sorts before
//! every `SourceRef` under the same key.
//!
//! File offsets are stored divided by the database sector size; an
//! insert with a misaligned offset is rejected and tallied, never fatal.

use crate::changes::Changes;
use crate::codec::{decode_varint, encode_varint};
use crate::error::{DbError, Result};
use crate::store::engine::{DupStore, OpenMode, PutOutcome};
use std::collections::BTreeSet;
use std::path::Path;

/// One record under a hash key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// Sole record of a single-reference hash
    Single {
        source_id: u64,
        offset_index: u64,
        entropy: u64,
        block_label: String,
    },
    /// Metadata head of a multi-reference hash; sorts first via the 0x00
    /// sentinel
    Meta { entropy: u64, block_label: String },
    /// One reference of a multi-reference hash
    SourceRef { source_id: u64, offset_index: u64 },
}

impl Record {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Record::Single {
                source_id,
                offset_index,
                entropy,
                block_label,
            } => {
                encode_varint(&mut buf, *source_id);
                encode_varint(&mut buf, *offset_index);
                encode_varint(&mut buf, *entropy);
                encode_varint(&mut buf, block_label.len() as u64);
                buf.extend_from_slice(block_label.as_bytes());
            }
            Record::Meta {
                entropy,
                block_label,
            } => {
                buf.push(0);
                encode_varint(&mut buf, *entropy);
                encode_varint(&mut buf, block_label.len() as u64);
                buf.extend_from_slice(block_label.as_bytes());
            }
            Record::SourceRef {
                source_id,
                offset_index,
            } => {
                encode_varint(&mut buf, *source_id);
                encode_varint(&mut buf, *offset_index);
            }
        }
        buf
    }

    /// Decode the first record under a key; the sentinel byte selects the
    /// shape
    pub fn decode_head(bytes: &[u8]) -> Result<Record> {
        let first = *bytes
            .first()
            .expect("hash data store corrupt: empty record under a populated key");
        if first == 0 {
            let mut pos = 1;
            let entropy = decode_varint(bytes, &mut pos)?;
            let block_label = decode_label(bytes, &mut pos)?;
            ensure_consumed(bytes, pos)?;
            Ok(Record::Meta {
                entropy,
                block_label,
            })
        } else {
            let mut pos = 0;
            let source_id = decode_varint(bytes, &mut pos)?;
            let offset_index = decode_varint(bytes, &mut pos)?;
            let entropy = decode_varint(bytes, &mut pos)?;
            let block_label = decode_label(bytes, &mut pos)?;
            ensure_consumed(bytes, pos)?;
            Ok(Record::Single {
                source_id,
                offset_index,
                entropy,
                block_label,
            })
        }
    }

    /// Decode a record that follows a `Meta` head
    pub fn decode_source_ref(bytes: &[u8]) -> Result<Record> {
        let mut pos = 0;
        let source_id = decode_varint(bytes, &mut pos)?;
        let offset_index = decode_varint(bytes, &mut pos)?;
        ensure_consumed(bytes, pos)?;
        Ok(Record::SourceRef {
            source_id,
            offset_index,
        })
    }
}

fn decode_label(bytes: &[u8], pos: &mut usize) -> Result<String> {
    let len = decode_varint(bytes, pos)? as usize;
    let end = pos
        .checked_add(len)
        .filter(|&e| e <= bytes.len())
        .ok_or_else(|| DbError::corrupt("block label overruns record"))?;
    let label = std::str::from_utf8(&bytes[*pos..end])
        .map_err(|_| DbError::corrupt("block label is not UTF-8"))?
        .to_string();
    *pos = end;
    Ok(label)
}

fn ensure_consumed(bytes: &[u8], pos: usize) -> Result<()> {
    if pos != bytes.len() {
        return Err(DbError::corrupt("trailing bytes in hash data record"));
    }
    Ok(())
}

/// Metadata and references of one hash, as returned by lookups
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashRecord {
    pub entropy: u64,
    pub block_label: String,
    /// (source id, file offset) pairs; ordered so iteration is
    /// deterministic
    pub pairs: BTreeSet<(u64, u64)>,
}

/// The hash data store
pub struct HashDataStore {
    store: DupStore,
    sector_size: u32,
    max_source_offset_pairs: u32,
}

impl HashDataStore {
    pub fn open(
        path: &Path,
        mode: OpenMode,
        sector_size: u32,
        max_source_offset_pairs: u32,
    ) -> Result<Self> {
        assert!(sector_size != 0, "sector size must be nonzero");
        Ok(Self {
            store: DupStore::open(path, mode)?,
            sector_size,
            max_source_offset_pairs,
        })
    }

    /// Insert or update one observation of `hash`. Returns the reference
    /// count for the hash after the operation, or 0 when the offset was
    /// rejected.
    ///
    /// Callers must hold the database write lock.
    pub fn insert(
        &self,
        hash: &[u8],
        source_id: u64,
        file_offset: u64,
        entropy: u64,
        block_label: &str,
        changes: &mut Changes,
    ) -> Result<u64> {
        assert!(source_id != 0, "source id 0 is reserved for the metadata sentinel");
        assert!(!hash.is_empty(), "empty hash key");

        // reject misaligned offsets without side effect
        if file_offset % u64::from(self.sector_size) != 0 {
            changes.hash_data_invalid_file_offset += 1;
            return Ok(0);
        }
        let offset_index = file_offset / u64::from(self.sector_size);
        let cap = self.max_source_offset_pairs;

        let head_bytes = match self.store.first_record(hash)? {
            None => {
                // first observation of this hash
                let record = Record::Single {
                    source_id,
                    offset_index,
                    entropy,
                    block_label: block_label.to_string(),
                };
                self.store.put_no_dup(hash, &record.encode())?;
                changes.hash_data_data_inserted += 1;
                changes.hash_data_source_inserted += 1;
                return Ok(1);
            }
            Some(bytes) => bytes,
        };

        match Record::decode_head(&head_bytes)? {
            Record::Single {
                source_id: prev_source_id,
                offset_index: prev_offset_index,
                entropy: prev_entropy,
                block_label: prev_label,
            } => {
                let source_same =
                    source_id == prev_source_id && offset_index == prev_offset_index;
                let data_same = entropy == prev_entropy && block_label == prev_label;
                let at_max = cap != 0 && 1 >= cap;

                if data_same {
                    changes.hash_data_data_same += 1;
                } else {
                    changes.hash_data_data_changed += 1;
                }
                if at_max {
                    changes.hash_data_source_at_max += 1;
                } else if source_same {
                    changes.hash_data_source_already_present += 1;
                } else {
                    changes.hash_data_source_inserted += 1;
                }

                if (source_same || at_max) && data_same {
                    // nothing to do
                    Ok(1)
                } else if source_same || at_max {
                    // same reference, new metadata: rewrite in place
                    self.store.delete(hash, &head_bytes)?;
                    let record = Record::Single {
                        source_id,
                        offset_index,
                        entropy,
                        block_label: block_label.to_string(),
                    };
                    self.store.put_no_dup(hash, &record.encode())?;
                    Ok(1)
                } else {
                    // second distinct reference: expand to the
                    // multi-reference layout, new metadata wins
                    self.store.delete(hash, &head_bytes)?;
                    let meta = Record::Meta {
                        entropy,
                        block_label: block_label.to_string(),
                    };
                    self.store.put_no_dup(hash, &meta.encode())?;
                    let prev_ref = Record::SourceRef {
                        source_id: prev_source_id,
                        offset_index: prev_offset_index,
                    };
                    self.store.put_no_dup(hash, &prev_ref.encode())?;
                    let new_ref = Record::SourceRef {
                        source_id,
                        offset_index,
                    };
                    self.store.put_no_dup(hash, &new_ref.encode())?;
                    Ok(2)
                }
            }
            Record::Meta {
                entropy: prev_entropy,
                block_label: prev_label,
            } => {
                // count before disturbing anything, minus the metadata head
                let count = self.store.count_dups(hash)? - 1;

                if entropy == prev_entropy && block_label == prev_label {
                    changes.hash_data_data_same += 1;
                } else {
                    changes.hash_data_data_changed += 1;
                    self.store.delete(hash, &head_bytes)?;
                    let meta = Record::Meta {
                        entropy,
                        block_label: block_label.to_string(),
                    };
                    self.store.put_no_dup(hash, &meta.encode())?;
                }

                if cap != 0 && count >= u64::from(cap) {
                    changes.hash_data_source_at_max += 1;
                    return Ok(count);
                }

                let record = Record::SourceRef {
                    source_id,
                    offset_index,
                };
                match self.store.put_no_dup(hash, &record.encode())? {
                    PutOutcome::Inserted => {
                        changes.hash_data_source_inserted += 1;
                        Ok(count + 1)
                    }
                    PutOutcome::AlreadyPresent => {
                        changes.hash_data_source_already_present += 1;
                        Ok(count)
                    }
                }
            }
            Record::SourceRef { .. } => unreachable!("decode_head never yields a source ref"),
        }
    }

    /// Read metadata and all references for `hash`
    pub fn find(&self, hash: &[u8]) -> Result<Option<HashRecord>> {
        assert!(!hash.is_empty(), "empty hash key");

        let records = self.store.records(hash)?;
        let Some(head) = records.first() else {
            return Ok(None);
        };

        match Record::decode_head(head)? {
            Record::Single {
                source_id,
                offset_index,
                entropy,
                block_label,
            } => {
                let mut pairs = BTreeSet::new();
                pairs.insert((source_id, offset_index * u64::from(self.sector_size)));
                Ok(Some(HashRecord {
                    entropy,
                    block_label,
                    pairs,
                }))
            }
            Record::Meta {
                entropy,
                block_label,
            } => {
                let mut pairs = BTreeSet::new();
                for bytes in &records[1..] {
                    match Record::decode_source_ref(bytes)? {
                        Record::SourceRef {
                            source_id,
                            offset_index,
                        } => {
                            pairs.insert((
                                source_id,
                                offset_index * u64::from(self.sector_size),
                            ));
                        }
                        _ => unreachable!(),
                    }
                }
                Ok(Some(HashRecord {
                    entropy,
                    block_label,
                    pairs,
                }))
            }
            Record::SourceRef { .. } => unreachable!("decode_head never yields a source ref"),
        }
    }

    /// Reference count for `hash` without decoding the references
    pub fn find_count(&self, hash: &[u8]) -> Result<u64> {
        assert!(!hash.is_empty(), "empty hash key");

        let Some(head) = self.store.first_record(hash)? else {
            return Ok(0);
        };
        let first = *head
            .first()
            .expect("hash data store corrupt: empty record under a populated key");
        if first != 0 {
            return Ok(1);
        }
        let dups = self.store.count_dups(hash)?;
        assert!(
            dups > 1,
            "hash data store corrupt: metadata record without source references"
        );
        Ok(dups - 1)
    }

    /// Smallest hash in the store
    pub fn first_hash(&self) -> Result<Option<Vec<u8>>> {
        self.store.first_key()
    }

    /// Hash following `last_hash` in byte order. `last_hash` must exist.
    pub fn next_hash(&self, last_hash: &[u8]) -> Result<Option<Vec<u8>>> {
        assert!(!last_hash.is_empty(), "cursor is already past the end");
        self.store.next_key(last_hash)
    }

    /// Number of records in the store (metadata heads included)
    pub fn record_count(&self) -> Result<u64> {
        self.store.record_count()
    }
}
