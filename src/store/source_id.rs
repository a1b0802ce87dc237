//! Source id store
//!
//! Interns file hashes as dense 64-bit source ids and keeps the
//! bijection both ways. Three key namespaces share one store:
//!
//! - `h` ‖ file_hash  -> varint(source_id)
//! - `i` ‖ varint(source_id) -> file_hash
//! - `c` -> varint(last assigned source id)
//!
//! Source id 0 is never assigned; the hash data store reserves it as the
//! metadata sentinel.

use crate::changes::Changes;
use crate::codec::{decode_varint, encode_varint};
use crate::error::{DbError, Result};
use crate::store::engine::{FlatStore, OpenMode};
use std::path::Path;

const BY_HASH: u8 = b'h';
const BY_ID: u8 = b'i';
const COUNTER_KEY: &[u8] = b"c";

pub struct SourceIdStore {
    store: FlatStore,
}

impl SourceIdStore {
    pub fn open(path: &Path, mode: OpenMode) -> Result<Self> {
        Ok(Self {
            store: FlatStore::open(path, mode)?,
        })
    }

    fn hash_key(file_hash: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(1 + file_hash.len());
        key.push(BY_HASH);
        key.extend_from_slice(file_hash);
        key
    }

    fn id_key(source_id: u64) -> Vec<u8> {
        let mut key = vec![BY_ID];
        encode_varint(&mut key, source_id);
        key
    }

    fn decode_id(bytes: &[u8]) -> Result<u64> {
        let mut pos = 0;
        let id = decode_varint(bytes, &mut pos)?;
        if pos != bytes.len() {
            return Err(DbError::corrupt("trailing bytes in source id record"));
        }
        Ok(id)
    }

    /// Intern a file hash, assigning the next source id on first sight.
    /// Returns (is_new, source_id). Idempotent per file hash.
    ///
    /// Callers must hold the database write lock.
    pub fn intern(&self, file_hash: &[u8], changes: &mut Changes) -> Result<(bool, u64)> {
        assert!(!file_hash.is_empty(), "empty file hash");

        if let Some(bytes) = self.store.get(&Self::hash_key(file_hash))? {
            changes.source_id_already_present += 1;
            return Ok((false, Self::decode_id(&bytes)?));
        }

        // next id from the monotone counter
        let last = match self.store.get(COUNTER_KEY)? {
            Some(bytes) => Self::decode_id(&bytes)?,
            None => 0,
        };
        let source_id = last + 1;

        let mut encoded = Vec::new();
        encode_varint(&mut encoded, source_id);
        self.store.put(&Self::hash_key(file_hash), &encoded)?;
        self.store.put(&Self::id_key(source_id), file_hash)?;
        self.store.put(COUNTER_KEY, &encoded)?;

        changes.source_id_inserted += 1;
        Ok((true, source_id))
    }

    /// Source id for a file hash, or None when never interned
    pub fn find_id(&self, file_hash: &[u8]) -> Result<Option<u64>> {
        assert!(!file_hash.is_empty(), "empty file hash");
        match self.store.get(&Self::hash_key(file_hash))? {
            Some(bytes) => Ok(Some(Self::decode_id(&bytes)?)),
            None => Ok(None),
        }
    }

    /// File hash for a source id. Every id reachable from the hash data
    /// store must resolve; anything else is a corrupt store.
    pub fn find_file_hash(&self, source_id: u64) -> Result<Vec<u8>> {
        self.store
            .get(&Self::id_key(source_id))?
            .ok_or_else(|| DbError::corrupt(format!("source id {} has no file hash", source_id)))
    }

    /// Smallest interned file hash
    pub fn first_source(&self) -> Result<Option<Vec<u8>>> {
        Ok(self
            .store
            .first_key_with_prefix(&[BY_HASH])?
            .map(|key| key[1..].to_vec()))
    }

    /// File hash following `last` in byte order. `last` must be interned.
    pub fn next_source(&self, last: &[u8]) -> Result<Option<Vec<u8>>> {
        assert!(!last.is_empty(), "cursor is already past the end");
        Ok(self
            .store
            .next_key_with_prefix(&[BY_HASH], &Self::hash_key(last))?
            .map(|key| key[1..].to_vec()))
    }

    /// Number of interned sources
    pub fn source_count(&self) -> Result<u64> {
        match self.store.get(COUNTER_KEY)? {
            Some(bytes) => Self::decode_id(&bytes),
            None => Ok(0),
        }
    }
}
