//! One-producer merge operations
//!
//! Streams hashes from a producer database into a consumer database:
//! plain add, repository-filtered add, repository-excluding add, and
//! deduplicate. Read operations hit the producer, write operations the
//! consumer; source ids are re-interned through file hashes.
//!
//! Sources already present in the consumer before the operation are
//! skipped entirely, and each new source's data and names are copied at
//! most once per operation.

use crate::error::Result;
use crate::import::ImportManager;
use crate::scan::{HashMatch, ScanManager};
use crate::store::SourceData;
use std::collections::HashSet;

/// Which name pairs of a source to copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NameFilter {
    All,
    MatchingRepository,
    OtherRepositories,
}

pub struct Adder<'a> {
    producer: &'a ScanManager,
    consumer: &'a ImportManager,
    repository_name: String,
    preexisting_sources: HashSet<Vec<u8>>,
    processed_sources: HashSet<Vec<u8>>,
    repository_sources: HashSet<Vec<u8>>,
    non_repository_sources: HashSet<Vec<u8>>,
}

impl<'a> Adder<'a> {
    pub fn new(producer: &'a ScanManager, consumer: &'a ImportManager) -> Result<Self> {
        Self::with_repository(producer, consumer, "")
    }

    /// An adder whose repository-conditional operations filter on
    /// `repository_name`
    pub fn with_repository(
        producer: &'a ScanManager,
        consumer: &'a ImportManager,
        repository_name: &str,
    ) -> Result<Self> {
        let mut preexisting_sources = HashSet::new();
        let mut cursor = consumer.first_source()?;
        while let Some(file_hash) = cursor {
            cursor = consumer.next_source(&file_hash)?;
            preexisting_sources.insert(file_hash);
        }
        Ok(Self {
            producer,
            consumer,
            repository_name: repository_name.to_string(),
            preexisting_sources,
            processed_sources: HashSet::new(),
            repository_sources: HashSet::new(),
            non_repository_sources: HashSet::new(),
        })
    }

    fn read_hash(&self, hash: &[u8]) -> Result<HashMatch> {
        Ok(self
            .producer
            .find_hash(hash)?
            .expect("adder driven past a hash the producer does not hold"))
    }

    /// Copy a source's data and selected names into the consumer, once
    fn copy_source(&mut self, file_hash: &[u8], filter: NameFilter) -> Result<()> {
        if !self.processed_sources.insert(file_hash.to_vec()) {
            return Ok(());
        }
        let data = self
            .producer
            .find_source_data(file_hash)?
            .unwrap_or_else(SourceData::default);
        self.consumer.insert_source_data(file_hash, &data)?;

        for (repository_name, filename) in self
            .producer
            .find_source_names(file_hash)?
            .unwrap_or_default()
        {
            let wanted = match filter {
                NameFilter::All => true,
                NameFilter::MatchingRepository => repository_name == self.repository_name,
                NameFilter::OtherRepositories => repository_name != self.repository_name,
            };
            if wanted {
                self.consumer
                    .insert_source_name(file_hash, &repository_name, &filename)?;
            }
        }
        Ok(())
    }

    /// Decide whether a source carries the filter repository name,
    /// another name, or both
    fn classify_source(&mut self, file_hash: &[u8]) -> Result<()> {
        assert!(
            !self.repository_name.is_empty(),
            "repository filter requires a repository name"
        );
        if self.repository_sources.contains(file_hash)
            || self.non_repository_sources.contains(file_hash)
        {
            return Ok(());
        }
        for (repository_name, _) in self
            .producer
            .find_source_names(file_hash)?
            .unwrap_or_default()
        {
            if repository_name == self.repository_name {
                self.repository_sources.insert(file_hash.to_vec());
            } else {
                self.non_repository_sources.insert(file_hash.to_vec());
            }
        }
        Ok(())
    }

    /// Copy one hash with all its references
    pub fn add(&mut self, hash: &[u8]) -> Result<()> {
        let matched = self.read_hash(hash)?;
        for (file_hash, file_offset) in &matched.pairs {
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
            self.copy_source(file_hash, NameFilter::All)?;
        }
        Ok(())
    }

    /// Copy only references whose source carries the filter repository
    pub fn add_repository(&mut self, hash: &[u8]) -> Result<()> {
        let matched = self.read_hash(hash)?;
        for (file_hash, file_offset) in &matched.pairs {
            if self.preexisting_sources.contains(file_hash) {
                continue;
            }
            self.classify_source(file_hash)?;
            if !self.repository_sources.contains(file_hash) {
                continue;
            }
            self.consumer.insert_hash(
                hash,
                file_hash,
                *file_offset,
                matched.entropy,
                &matched.block_label,
            )?;
            self.copy_source(file_hash, NameFilter::MatchingRepository)?;
        }
        Ok(())
    }

    /// Copy only references whose source carries a name outside the
    /// filter repository
    pub fn add_non_repository(&mut self, hash: &[u8]) -> Result<()> {
        let matched = self.read_hash(hash)?;
        for (file_hash, file_offset) in &matched.pairs {
            if self.preexisting_sources.contains(file_hash) {
                continue;
            }
            self.classify_source(file_hash)?;
            if !self.non_repository_sources.contains(file_hash) {
                continue;
            }
            self.consumer.insert_hash(
                hash,
                file_hash,
                *file_offset,
                matched.entropy,
                &matched.block_label,
            )?;
            self.copy_source(file_hash, NameFilter::OtherRepositories)?;
        }
        Ok(())
    }

    /// Copy the hash only when it has exactly one reference
    pub fn deduplicate(&mut self, hash: &[u8]) -> Result<()> {
        if self.producer.find_hash_count(hash)? == 1 {
            self.add(hash)?;
        }
        Ok(())
    }
}

/// Drive an adder operation over every hash of the producer, in order
pub fn for_each_hash<F>(producer: &ScanManager, mut op: F) -> Result<u64>
where
    F: FnMut(&[u8]) -> Result<()>,
{
    let mut visited = 0;
    let mut cursor = producer.hash_begin()?;
    while let Some(hash) = cursor {
        op(&hash)?;
        visited += 1;
        cursor = producer.hash_next(&hash)?;
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

    fn seed_producer(db: &Path) {
        let manager = ImportManager::open(db, "seed").unwrap();
        manager
            .insert_source_name(b"\x01\x01", "repo1", "file1")
            .unwrap();
        manager
            .insert_source_name(b"\x02\x02", "repo2", "file2")
            .unwrap();
        manager
            .insert_hash(b"\xaa\xaa", b"\x01\x01", 0, 7, "W")
            .unwrap();
        manager
            .insert_hash(b"\xaa\xaa", b"\x02\x02", 512, 7, "W")
            .unwrap();
        manager
            .insert_hash(b"\xbb\xbb", b"\x01\x01", 1024, 3, "")
            .unwrap();
        manager.finish().unwrap();
    }

    #[test]
    fn test_add_copies_everything() {
        let dir = tempdir().unwrap();
        let src = new_db(dir.path(), "src");
        let dst = new_db(dir.path(), "dst");
        seed_producer(&src);

        let producer = ScanManager::open(&src).unwrap();
        let consumer = ImportManager::open(&dst, "add").unwrap();
        let mut adder = Adder::new(&producer, &consumer).unwrap();
        for_each_hash(&producer, |hash| adder.add(hash)).unwrap();
        consumer.finish().unwrap();

        let check = ScanManager::open(&dst).unwrap();
        assert_eq!(check.find_hash_count(b"\xaa\xaa").unwrap(), 2);
        assert_eq!(check.find_hash_count(b"\xbb\xbb").unwrap(), 1);
        let matched = check.find_hash(b"\xaa\xaa").unwrap().unwrap();
        assert_eq!(matched.entropy, 7);
        assert_eq!(matched.block_label, "W");
        let names = check.find_source_names(b"\x01\x01").unwrap().unwrap();
        assert_eq!(names, vec![("repo1".to_string(), "file1".to_string())]);
    }

    #[test]
    fn test_add_repository_filters_references() {
        let dir = tempdir().unwrap();
        let src = new_db(dir.path(), "src");
        let dst = new_db(dir.path(), "dst");
        seed_producer(&src);

        let producer = ScanManager::open(&src).unwrap();
        let consumer = ImportManager::open(&dst, "add_repository").unwrap();
        let mut adder = Adder::with_repository(&producer, &consumer, "repo1").unwrap();
        for_each_hash(&producer, |hash| adder.add_repository(hash)).unwrap();
        consumer.finish().unwrap();

        let check = ScanManager::open(&dst).unwrap();
        let matched = check.find_hash(b"\xaa\xaa").unwrap().unwrap();
        let pairs: Vec<_> = matched.pairs.iter().cloned().collect();
        assert_eq!(pairs, vec![(b"\x01\x01".to_vec(), 0)]);
        // source 0x0202 carries only repo2 and is excluded
        assert!(check.find_source_names(b"\x02\x02").unwrap().is_none());
    }

    #[test]
    fn test_add_non_repository_excludes_references() {
        let dir = tempdir().unwrap();
        let src = new_db(dir.path(), "src");
        let dst = new_db(dir.path(), "dst");
        seed_producer(&src);

        let producer = ScanManager::open(&src).unwrap();
        let consumer = ImportManager::open(&dst, "subtract_repository").unwrap();
        let mut adder = Adder::with_repository(&producer, &consumer, "repo1").unwrap();
        for_each_hash(&producer, |hash| adder.add_non_repository(hash)).unwrap();
        consumer.finish().unwrap();

        let check = ScanManager::open(&dst).unwrap();
        let matched = check.find_hash(b"\xaa\xaa").unwrap().unwrap();
        let pairs: Vec<_> = matched.pairs.iter().cloned().collect();
        assert_eq!(pairs, vec![(b"\x02\x02".to_vec(), 512)]);
        assert_eq!(check.find_hash_count(b"\xbb\xbb").unwrap(), 0);
    }

    #[test]
    fn test_deduplicate_keeps_single_reference_hashes() {
        let dir = tempdir().unwrap();
        let src = new_db(dir.path(), "src");
        let dst = new_db(dir.path(), "dst");
        seed_producer(&src);

        let producer = ScanManager::open(&src).unwrap();
        let consumer = ImportManager::open(&dst, "deduplicate").unwrap();
        let mut adder = Adder::new(&producer, &consumer).unwrap();
        for_each_hash(&producer, |hash| adder.deduplicate(hash)).unwrap();
        consumer.finish().unwrap();

        let check = ScanManager::open(&dst).unwrap();
        assert_eq!(check.find_hash_count(b"\xaa\xaa").unwrap(), 0);
        assert_eq!(check.find_hash_count(b"\xbb\xbb").unwrap(), 1);
    }

    #[test]
    fn test_preexisting_sources_are_skipped() {
        let dir = tempdir().unwrap();
        let src = new_db(dir.path(), "src");
        let dst = new_db(dir.path(), "dst");
        seed_producer(&src);

        // destination already knows source 0x0101
        {
            let manager = ImportManager::open(&dst, "seed dst").unwrap();
            manager
                .insert_source_name(b"\x01\x01", "old", "old")
                .unwrap();
            manager.finish().unwrap();
        }

        let producer = ScanManager::open(&src).unwrap();
        let consumer = ImportManager::open(&dst, "add").unwrap();
        let mut adder = Adder::new(&producer, &consumer).unwrap();
        for_each_hash(&producer, |hash| adder.add(hash)).unwrap();
        consumer.finish().unwrap();

        let check = ScanManager::open(&dst).unwrap();
        // only the reference from the new source arrived
        let matched = check.find_hash(b"\xaa\xaa").unwrap().unwrap();
        let pairs: Vec<_> = matched.pairs.iter().cloned().collect();
        assert_eq!(pairs, vec![(b"\x02\x02".to_vec(), 512)]);
    }
}
