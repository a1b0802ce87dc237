//! Hash index store
//!
//! An approximate presence filter in front of the hash data store. The
//! key is the first `hash_prefix_bits` of a hash, padded to a byte
//! boundary; the value is the last `hash_suffix_bytes`. A miss here is
//! authoritative; a hit still needs the hash data store to confirm.

use crate::changes::Changes;
use crate::error::Result;
use crate::store::engine::{DupStore, OpenMode, PutOutcome};
use std::path::Path;

pub struct HashIndexStore {
    store: DupStore,
    prefix_bits: u32,
    suffix_bytes: u32,
}

impl HashIndexStore {
    pub fn open(path: &Path, mode: OpenMode, prefix_bits: u32, suffix_bytes: u32) -> Result<Self> {
        assert!(prefix_bits != 0, "hash prefix width must be nonzero");
        Ok(Self {
            store: DupStore::open(path, mode)?,
            prefix_bits,
            suffix_bytes,
        })
    }

    /// Prefix key: the leading bits of the hash, trailing bits of the
    /// last byte masked to zero
    fn prefix_key(&self, hash: &[u8]) -> Vec<u8> {
        let whole_bytes = (self.prefix_bits / 8) as usize;
        let spare_bits = self.prefix_bits % 8;
        let key_len = whole_bytes + usize::from(spare_bits != 0);
        let take = key_len.min(hash.len());

        let mut key = hash[..take].to_vec();
        if spare_bits != 0 && take == key_len {
            let mask = 0xffu8 << (8 - spare_bits);
            key[key_len - 1] &= mask;
        }
        key
    }

    /// Suffix value: the trailing bytes of the hash
    fn suffix_value(&self, hash: &[u8]) -> Vec<u8> {
        let take = (self.suffix_bytes as usize).min(hash.len());
        hash[hash.len() - take..].to_vec()
    }

    pub fn insert(&self, hash: &[u8], changes: &mut Changes) -> Result<()> {
        assert!(!hash.is_empty(), "empty hash key");

        let key = self.prefix_key(hash);
        let new_prefix = self.store.count_dups(&key)? == 0;
        match self.store.put_no_dup(&key, &self.suffix_value(hash))? {
            PutOutcome::Inserted => {
                if new_prefix {
                    changes.hash_prefix_inserted += 1;
                } else {
                    changes.hash_suffix_inserted += 1;
                }
            }
            PutOutcome::AlreadyPresent => {}
        }
        Ok(())
    }

    /// Approximate membership test. False means the hash is definitely
    /// absent from the database.
    pub fn maybe_present(&self, hash: &[u8]) -> Result<bool> {
        assert!(!hash.is_empty(), "empty hash key");

        let key = self.prefix_key(hash);
        let suffix = self.suffix_value(hash);
        for record in self.store.records(&key)? {
            if record == suffix {
                return Ok(true);
            }
        }
        Ok(false)
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
    fn test_prefix_key_masks_trailing_bits() {
        let dir = tempdir().unwrap();
        // 12 bits: one whole byte plus the top nibble of the next
        let store = HashIndexStore::open(dir.path(), OpenMode::Create, 12, 2).unwrap();
        let key = store.prefix_key(&[0xab, 0xcd, 0xef]);
        assert_eq!(key, vec![0xab, 0xc0]);
    }

    #[test]
    fn test_insert_and_lookup() {
        let dir = tempdir().unwrap();
        let store = HashIndexStore::open(dir.path(), OpenMode::Create, 16, 2).unwrap();
        let mut changes = Changes::new();

        let hash = [0x11, 0x22, 0x33, 0x44];
        store.insert(&hash, &mut changes).unwrap();
        assert_eq!(changes.hash_prefix_inserted, 1);

        assert!(store.maybe_present(&hash).unwrap());
        assert!(!store.maybe_present(&[0x99, 0x22, 0x33, 0x44]).unwrap());

        // same prefix, different suffix
        let sibling = [0x11, 0x22, 0x77, 0x88];
        assert!(!store.maybe_present(&sibling).unwrap());
        store.insert(&sibling, &mut changes).unwrap();
        assert_eq!(changes.hash_suffix_inserted, 1);
        assert!(store.maybe_present(&sibling).unwrap());

        // re-insert moves nothing
        store.insert(&hash, &mut changes).unwrap();
        assert_eq!(changes.hash_prefix_inserted, 1);
        assert_eq!(changes.hash_suffix_inserted, 1);
    }

    #[test]
    fn test_short_hash_is_handled() {
        let dir = tempdir().unwrap();
        // prefix wider than the hash itself
        let store = HashIndexStore::open(dir.path(), OpenMode::Create, 64, 3).unwrap();
        let mut changes = Changes::new();

        let hash = [0xaa, 0xbb];
        store.insert(&hash, &mut changes).unwrap();
        assert!(store.maybe_present(&hash).unwrap());
    }
}
