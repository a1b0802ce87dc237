//! Two-producer set algebra
//!
//! Streams hashes from producer A, consults producer B, and writes the
//! set-algebraic result into consumer C: intersect by exact reference,
//! intersect by hash, subtract by exact reference, subtract by hash.
//! Metadata always comes from A.

use crate::error::Result;
use crate::import::ImportManager;
use crate::scan::{HashMatch, ScanManager};
use crate::store::SourceData;
use std::collections::{BTreeSet, HashSet};

pub struct SetAdder<'a> {
    producer_a: &'a ScanManager,
    producer_b: &'a ScanManager,
    consumer: &'a ImportManager,
    preexisting_sources: HashSet<Vec<u8>>,
    processed_sources: HashSet<Vec<u8>>,
}

impl<'a> SetAdder<'a> {
    pub fn new(
        producer_a: &'a ScanManager,
        producer_b: &'a ScanManager,
        consumer: &'a ImportManager,
    ) -> Result<Self> {
        let mut preexisting_sources = HashSet::new();
        let mut cursor = consumer.first_source()?;
        while let Some(file_hash) = cursor {
            cursor = consumer.next_source(&file_hash)?;
            preexisting_sources.insert(file_hash);
        }
        Ok(Self {
            producer_a,
            producer_b,
            consumer,
            preexisting_sources,
            processed_sources: HashSet::new(),
        })
    }

    fn read_hash_a(&self, hash: &[u8]) -> Result<HashMatch> {
        Ok(self
            .producer_a
            .find_hash(hash)?
            .expect("set adder driven past a hash producer A does not hold"))
    }

    /// Copy a source's data and names into the consumer, once. Data
    /// comes from A when A knows the source, else from B; names come
    /// from both.
    fn copy_source(&mut self, file_hash: &[u8]) -> Result<()> {
        if !self.processed_sources.insert(file_hash.to_vec()) {
            return Ok(());
        }

        let data = match self.producer_a.find_source_data(file_hash)? {
            Some(data) => data,
            None => self
                .producer_b
                .find_source_data(file_hash)?
                .unwrap_or_else(SourceData::default),
        };
        self.consumer.insert_source_data(file_hash, &data)?;

        for producer in [self.producer_a, self.producer_b] {
            for (repository_name, filename) in
                producer.find_source_names(file_hash)?.unwrap_or_default()
            {
                self.consumer
                    .insert_source_name(file_hash, &repository_name, &filename)?;
            }
        }
        Ok(())
    }

    fn emit(&mut self, hash: &[u8], matched: &HashMatch, pairs: &BTreeSet<(Vec<u8>, u64)>) -> Result<()> {
        for (file_hash, file_offset) in pairs {
            if self.preexisting_sources.contains(file_hash) {
                continue;
            }
            self.consumer.insert_hash(
                hash,
                file_hash,
                *file_offset,
                matched.entropy,
                &matched.block_label,
            )?;
            self.copy_source(file_hash)?;
        }
        Ok(())
    }

    /// Copy references present in both A and B
    pub fn intersect(&mut self, hash: &[u8]) -> Result<()> {
        let matched_a = self.read_hash_a(hash)?;
        let Some(matched_b) = self.producer_b.find_hash(hash)? else {
            return Ok(());
        };
        let common: BTreeSet<(Vec<u8>, u64)> = matched_a
            .pairs
            .intersection(&matched_b.pairs)
            .cloned()
            .collect();
        self.emit(hash, &matched_a, &common)
    }

    /// Copy all of A's references whenever the hash occurs in B at all
    pub fn intersect_hash(&mut self, hash: &[u8]) -> Result<()> {
        let matched_a = self.read_hash_a(hash)?;
        if self.producer_b.find_hash_count(hash)? == 0 {
            return Ok(());
        }
        let pairs = matched_a.pairs.clone();
        self.emit(hash, &matched_a, &pairs)
    }

    /// Copy references of A that are absent from B
    pub fn subtract(&mut self, hash: &[u8]) -> Result<()> {
        let matched_a = self.read_hash_a(hash)?;
        let pairs_b = match self.producer_b.find_hash(hash)? {
            Some(matched_b) => matched_b.pairs,
            None => BTreeSet::new(),
        };
        let remaining: BTreeSet<(Vec<u8>, u64)> =
            matched_a.pairs.difference(&pairs_b).cloned().collect();
        self.emit(hash, &matched_a, &remaining)
    }

    /// Copy all of A's references when the hash is absent from B
    pub fn subtract_hash(&mut self, hash: &[u8]) -> Result<()> {
        let matched_a = self.read_hash_a(hash)?;
        if self.producer_b.find_hash_count(hash)? != 0 {
            return Ok(());
        }
        let pairs = matched_a.pairs.clone();
        self.emit(hash, &matched_a, &pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::create_database;
    use crate::ops::adder::for_each_hash;
    use crate::settings::Settings;
    use std::path::Path;
    use tempfile::tempdir;

    fn new_db(dir: &Path, name: &str) -> std::path::PathBuf {
        let db = dir.join(name);
        create_database(&db, &Settings::default(), "test create").unwrap();
        db
    }

    /// A: H1 -> {s1, s2}; B: H1 -> {s2, s3}; plus H2 only in A
    fn seed(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
        let a = new_db(dir, "a");
        let b = new_db(dir, "b");
        {
            let manager = ImportManager::open(&a, "seed a").unwrap();
            manager
                .insert_hash(b"\xaa\xaa", b"\x01\x01", 0, 7, "W")
                .unwrap();
            manager
                .insert_hash(b"\xaa\xaa", b"\x02\x02", 512, 7, "W")
                .unwrap();
            manager
                .insert_hash(b"\xbb\xbb", b"\x01\x01", 1024, 0, "")
                .unwrap();
            manager.finish().unwrap();
        }
        {
            let manager = ImportManager::open(&b, "seed b").unwrap();
            manager
                .insert_hash(b"\xaa\xaa", b"\x02\x02", 512, 7, "W")
                .unwrap();
            manager
                .insert_hash(b"\xaa\xaa", b"\x03\x03", 0, 7, "W")
                .unwrap();
            manager.finish().unwrap();
        }
        (a, b)
    }

    fn run<F>(dir: &Path, a: &Path, b: &Path, op: F) -> std::path::PathBuf
    where
        F: Fn(&mut SetAdder, &[u8]) -> Result<()>,
    {
        let c = new_db(dir, "c");
        let scan_a = ScanManager::open(a).unwrap();
        let scan_b = ScanManager::open(b).unwrap();
        let consumer = ImportManager::open(&c, "set op").unwrap();
        let mut adder = SetAdder::new(&scan_a, &scan_b, &consumer).unwrap();
        for_each_hash(&scan_a, |hash| op(&mut adder, hash)).unwrap();
        consumer.finish().unwrap();
        c
    }

    #[test]
    fn test_intersect_keeps_common_references() {
        let dir = tempdir().unwrap();
        let (a, b) = seed(dir.path());
        let c = run(dir.path(), &a, &b, |adder, hash| adder.intersect(hash));

        let check = ScanManager::open(&c).unwrap();
        let matched = check.find_hash(b"\xaa\xaa").unwrap().unwrap();
        let pairs: Vec<_> = matched.pairs.iter().cloned().collect();
        assert_eq!(pairs, vec![(b"\x02\x02".to_vec(), 512)]);
        // H2 is not in B
        assert_eq!(check.find_hash_count(b"\xbb\xbb").unwrap(), 0);
    }

    #[test]
    fn test_intersect_hash_keeps_all_a_references() {
        let dir = tempdir().unwrap();
        let (a, b) = seed(dir.path());
        let c = run(dir.path(), &a, &b, |adder, hash| adder.intersect_hash(hash));

        let check = ScanManager::open(&c).unwrap();
        let matched = check.find_hash(b"\xaa\xaa").unwrap().unwrap();
        let pairs: Vec<_> = matched.pairs.iter().cloned().collect();
        assert_eq!(
            pairs,
            vec![(b"\x01\x01".to_vec(), 0), (b"\x02\x02".to_vec(), 512)]
        );
        assert_eq!(check.find_hash_count(b"\xbb\xbb").unwrap(), 0);
    }

    #[test]
    fn test_subtract_removes_exact_triples() {
        let dir = tempdir().unwrap();
        let (a, b) = seed(dir.path());
        let c = run(dir.path(), &a, &b, |adder, hash| adder.subtract(hash));

        let check = ScanManager::open(&c).unwrap();
        let matched = check.find_hash(b"\xaa\xaa").unwrap().unwrap();
        let pairs: Vec<_> = matched.pairs.iter().cloned().collect();
        // (s2, 512) existed in B and is gone
        assert_eq!(pairs, vec![(b"\x01\x01".to_vec(), 0)]);
        assert_eq!(check.find_hash_count(b"\xbb\xbb").unwrap(), 1);
    }

    #[test]
    fn test_subtract_hash_drops_shared_hashes_entirely() {
        let dir = tempdir().unwrap();
        let (a, b) = seed(dir.path());
        let c = run(dir.path(), &a, &b, |adder, hash| adder.subtract_hash(hash));

        let check = ScanManager::open(&c).unwrap();
        assert_eq!(check.find_hash_count(b"\xaa\xaa").unwrap(), 0);
        assert_eq!(check.find_hash_count(b"\xbb\xbb").unwrap(), 1);
    }
}
