//! K-way merge of several producer databases into one consumer
//!
//! Maintains an ordered frontier keyed by (current hash, producer
//! index): pop the smallest, copy that hash from its producer, advance
//! the producer, re-insert while nonempty. Ties between producers
//! holding the same hash break by producer index, and the consumer's
//! upsert semantics deduplicate the overlap.

use crate::error::Result;
use crate::import::ImportManager;
use crate::ops::adder::Adder;
use crate::scan::ScanManager;
use std::collections::BTreeSet;

/// Merge every hash of every producer into the consumer, in global hash
/// order. Returns the number of (hash, producer) visits.
pub fn add_multiple(producers: &[ScanManager], consumer: &ImportManager) -> Result<u64> {
    // one adder per producer, each with its own source bookkeeping
    let mut adders: Vec<Adder> = producers
        .iter()
        .map(|producer| Adder::new(producer, consumer))
        .collect::<Result<_>>()?;

    let mut frontier: BTreeSet<(Vec<u8>, usize)> = BTreeSet::new();
    for (index, producer) in producers.iter().enumerate() {
        if let Some(hash) = producer.hash_begin()? {
            frontier.insert((hash, index));
        }
    }

    let mut visited = 0;
    while let Some((hash, index)) = frontier.pop_first() {
        adders[index].add(&hash)?;
        visited += 1;
        if let Some(next) = producers[index].hash_next(&hash)? {
            frontier.insert((next, index));
        }
    }
    Ok(visited)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::create_database;
    use crate::settings::Settings;
    use std::path::Path;
    use tempfile::tempdir;

    fn new_db(dir: &Path, name: &str) -> std::path::PathBuf {
        let db = dir.join(name);
        create_database(&db, &Settings::default(), "test create").unwrap();
        db
    }

    #[test]
    fn test_add_multiple_merges_and_deduplicates() {
        let dir = tempdir().unwrap();
        let a = new_db(dir.path(), "a");
        let b = new_db(dir.path(), "b");
        let c = new_db(dir.path(), "c");

        {
            let manager = ImportManager::open(&a, "seed a").unwrap();
            manager
                .insert_hash(b"\xaa\xaa", b"\x01\x01", 0, 1, "")
                .unwrap();
            manager
                .insert_hash(b"\xcc\xcc", b"\x01\x01", 512, 1, "")
                .unwrap();
            manager.finish().unwrap();
        }
        {
            let manager = ImportManager::open(&b, "seed b").unwrap();
            manager
                .insert_hash(b"\xbb\xbb", b"\x02\x02", 0, 2, "")
                .unwrap();
            // overlaps with a's first hash, same reference
            manager
                .insert_hash(b"\xaa\xaa", b"\x01\x01", 0, 1, "")
                .unwrap();
            manager.finish().unwrap();
        }

        let producers = vec![ScanManager::open(&a).unwrap(), ScanManager::open(&b).unwrap()];
        let consumer = ImportManager::open(&c, "add_multiple").unwrap();
        let visited = add_multiple(&producers, &consumer).unwrap();
        assert_eq!(visited, 4);
        consumer.finish().unwrap();

        let check = ScanManager::open(&c).unwrap();
        assert_eq!(check.find_hash_count(b"\xaa\xaa").unwrap(), 1);
        assert_eq!(check.find_hash_count(b"\xbb\xbb").unwrap(), 1);
        assert_eq!(check.find_hash_count(b"\xcc\xcc").unwrap(), 1);

        // all hashes present, in order
        let mut visited = Vec::new();
        let mut cursor = check.hash_begin().unwrap();
        while let Some(hash) = cursor {
            cursor = check.hash_next(&hash).unwrap();
            visited.push(hash);
        }
        assert_eq!(
            visited,
            vec![b"\xaa\xaa".to_vec(), b"\xbb\xbb".to_vec(), b"\xcc\xcc".to_vec()]
        );
    }
}
