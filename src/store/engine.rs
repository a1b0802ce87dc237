//! Ordered key-value engine abstraction
//!
//! Every store owns one RocksDB instance under its own subdirectory.
//! Two flavors are provided:
//!
//! - [`DupStore`]: an ordered map allowing multiple records per key, the
//!   engine contract the hash-data store is built on. Records under one
//!   key are delivered in byte-lexicographic order; `put_no_dup` reports
//!   an already-present record distinguishably.
//! - [`FlatStore`]: a plain single-valued ordered map.
//!
//! Multi-valued keys are emulated with an order-preserving composite key:
//! the engine key is `logical_key ‖ record` and the engine value holds the
//! varint-encoded logical key length, so every record is individually
//! addressable and full scans can recover the key/record split. Logical
//! key spaces must be prefix-free (fixed-length hashes, self-delimiting
//! varints); all stores in this crate satisfy that.
//!
//! RocksDB manages its own file growth and gives readers snapshot
//! isolation; write serialization is the import manager's concern.

use crate::codec::{decode_varint, encode_varint};
use crate::error::{DbError, Result};
use rocksdb::{Direction, IteratorMode, Options, DB};
use std::path::Path;

/// How a store is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Create the store; the directory may not hold one yet
    Create,
    /// Open an existing store for writing
    ReadWrite,
    /// Open an existing store read-only; sees a snapshot
    ReadOnly,
}

/// Result of a guarded put
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Inserted,
    AlreadyPresent,
}

/// Write-optimized options, tuned for bulk import workloads
fn db_options(create: bool) -> Options {
    let mut opts = Options::default();
    opts.create_if_missing(create);
    opts.increase_parallelism(num_cpus::get() as i32);
    opts.set_max_background_jobs(4);

    // Smaller buffers flush more often, which keeps memory bounded on
    // imports of hundreds of millions of records.
    opts.set_write_buffer_size(32 * 1024 * 1024);
    opts.set_max_write_buffer_number(2);

    opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
    opts
}

fn open_db(path: &Path, mode: OpenMode) -> Result<DB> {
    let db = match mode {
        OpenMode::Create => DB::open(&db_options(true), path)?,
        OpenMode::ReadWrite => DB::open(&db_options(false), path)?,
        OpenMode::ReadOnly => DB::open_for_read_only(&db_options(false), path, false)?,
    };
    Ok(db)
}

/// Split a composite entry into its logical key length
fn logical_key_len(engine_key: &[u8], engine_value: &[u8]) -> Result<usize> {
    let mut pos = 0;
    let len = decode_varint(engine_value, &mut pos)? as usize;
    if len > engine_key.len() {
        return Err(DbError::corrupt("stored key length exceeds entry"));
    }
    Ok(len)
}

/// Ordered multi-valued store
pub struct DupStore {
    db: DB,
}

impl DupStore {
    pub fn open(path: &Path, mode: OpenMode) -> Result<Self> {
        Ok(Self {
            db: open_db(path, mode)?,
        })
    }

    fn composite(key: &[u8], record: &[u8]) -> (Vec<u8>, Vec<u8>) {
        let mut engine_key = Vec::with_capacity(key.len() + record.len());
        engine_key.extend_from_slice(key);
        engine_key.extend_from_slice(record);
        let mut engine_value = Vec::new();
        encode_varint(&mut engine_value, key.len() as u64);
        (engine_key, engine_value)
    }

    /// Insert a record under `key` unless the identical record is already
    /// present
    pub fn put_no_dup(&self, key: &[u8], record: &[u8]) -> Result<PutOutcome> {
        let (engine_key, engine_value) = Self::composite(key, record);
        if self.db.get(&engine_key)?.is_some() {
            return Ok(PutOutcome::AlreadyPresent);
        }
        self.db.put(&engine_key, &engine_value)?;
        Ok(PutOutcome::Inserted)
    }

    /// Remove one record under `key`
    pub fn delete(&self, key: &[u8], record: &[u8]) -> Result<()> {
        let (engine_key, _) = Self::composite(key, record);
        self.db.delete(&engine_key)?;
        Ok(())
    }

    /// First record under `key` in byte order, or None when the key is
    /// absent
    pub fn first_record(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut iter = self
            .db
            .iterator(IteratorMode::From(key, Direction::Forward));
        match iter.next() {
            Some(entry) => {
                let (engine_key, _) = entry?;
                if engine_key.starts_with(key) {
                    Ok(Some(engine_key[key.len()..].to_vec()))
                } else {
                    Ok(None)
                }
            }
            None => Ok(None),
        }
    }

    /// All records under `key`, in byte order
    pub fn records(&self, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut out = Vec::new();
        for entry in self
            .db
            .iterator(IteratorMode::From(key, Direction::Forward))
        {
            let (engine_key, _) = entry?;
            if !engine_key.starts_with(key) {
                break;
            }
            out.push(engine_key[key.len()..].to_vec());
        }
        Ok(out)
    }

    /// Number of records under `key`
    pub fn count_dups(&self, key: &[u8]) -> Result<u64> {
        let mut count = 0;
        for entry in self
            .db
            .iterator(IteratorMode::From(key, Direction::Forward))
        {
            let (engine_key, _) = entry?;
            if !engine_key.starts_with(key) {
                break;
            }
            count += 1;
        }
        Ok(count)
    }

    /// Smallest logical key in the store
    pub fn first_key(&self) -> Result<Option<Vec<u8>>> {
        let mut iter = self.db.iterator(IteratorMode::Start);
        match iter.next() {
            Some(entry) => {
                let (engine_key, engine_value) = entry?;
                let len = logical_key_len(&engine_key, &engine_value)?;
                Ok(Some(engine_key[..len].to_vec()))
            }
            None => Ok(None),
        }
    }

    /// Logical key following `last`, skipping all of `last`'s records
    /// (next-no-dup). `last` must be present in the store.
    pub fn next_key(&self, last: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut iter = self
            .db
            .iterator(IteratorMode::From(last, Direction::Forward));
        match iter.next() {
            Some(entry) => {
                let (engine_key, _) = entry?;
                assert!(
                    engine_key.starts_with(last),
                    "cursor key is not present in the store"
                );
            }
            None => panic!("cursor key is not present in the store"),
        }
        for entry in iter {
            let (engine_key, engine_value) = entry?;
            if engine_key.starts_with(last) {
                continue;
            }
            let len = logical_key_len(&engine_key, &engine_value)?;
            return Ok(Some(engine_key[..len].to_vec()));
        }
        Ok(None)
    }

    /// Total number of records across all keys
    pub fn record_count(&self) -> Result<u64> {
        let mut count = 0;
        for entry in self.db.iterator(IteratorMode::Start) {
            entry?;
            count += 1;
        }
        Ok(count)
    }
}

/// Ordered single-valued store
pub struct FlatStore {
    db: DB,
}

impl FlatStore {
    pub fn open(path: &Path, mode: OpenMode) -> Result<Self> {
        Ok(Self {
            db: open_db(path, mode)?,
        })
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key)?.map(|v| v.to_vec()))
    }

    /// Insert or overwrite
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db.put(key, value)?;
        Ok(())
    }

    /// Insert unless the key already exists
    pub fn put_if_absent(&self, key: &[u8], value: &[u8]) -> Result<PutOutcome> {
        if self.db.get(key)?.is_some() {
            return Ok(PutOutcome::AlreadyPresent);
        }
        self.db.put(key, value)?;
        Ok(PutOutcome::Inserted)
    }

    /// Smallest key starting with `prefix`, full key returned
    pub fn first_key_with_prefix(&self, prefix: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut iter = self
            .db
            .iterator(IteratorMode::From(prefix, Direction::Forward));
        match iter.next() {
            Some(entry) => {
                let (key, _) = entry?;
                if key.starts_with(prefix) {
                    Ok(Some(key.to_vec()))
                } else {
                    Ok(None)
                }
            }
            None => Ok(None),
        }
    }

    /// Key following `last` within `prefix`, or None at the end of the
    /// prefix range. `last` must be present.
    pub fn next_key_with_prefix(&self, prefix: &[u8], last: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut iter = self
            .db
            .iterator(IteratorMode::From(last, Direction::Forward));
        match iter.next() {
            Some(entry) => {
                let (key, _) = entry?;
                assert!(
                    key.as_ref() == last,
                    "cursor key is not present in the store"
                );
            }
            None => panic!("cursor key is not present in the store"),
        }
        match iter.next() {
            Some(entry) => {
                let (key, _) = entry?;
                if key.starts_with(prefix) {
                    Ok(Some(key.to_vec()))
                } else {
                    Ok(None)
                }
            }
            None => Ok(None),
        }
    }

    /// Total number of entries
    pub fn record_count(&self) -> Result<u64> {
        let mut count = 0;
        for entry in self.db.iterator(IteratorMode::Start) {
            entry?;
            count += 1;
        }
        Ok(count)
    }
}
