//! Import manager
//!
//! The write-side façade. Owns read-write handles on all five stores and
//! serializes writers with one process-local mutex: the mutex guards the
//! change counters, so holding the counters means holding the write lock
//! for the span of one logical upsert. Cross-process writing is not
//! supported.

use crate::changes::Changes;
use crate::error::{DbError, Result};
use crate::logger::Logger;
use crate::settings::{read_settings, write_settings, Settings};
use crate::store::{
    HashDataStore, HashIndexStore, OpenMode, SourceData, SourceDataStore, SourceIdStore,
    SourceNameStore, HASH_DATA_STORE_DIR, HASH_STORE_DIR, SOURCE_DATA_STORE_DIR,
    SOURCE_ID_STORE_DIR, SOURCE_NAME_STORE_DIR,
};
use parking_lot::Mutex;
use std::fs;
use std::path::Path;
use tracing::info;

/// Create a new database directory with its stores, settings, and log.
/// The path must not exist yet.
pub fn create_database(db_dir: &Path, settings: &Settings, command: &str) -> Result<()> {
    if db_dir.exists() {
        return Err(DbError::AlreadyExists {
            path: db_dir.to_path_buf(),
        });
    }
    fs::create_dir_all(db_dir)?;
    write_settings(db_dir, settings)?;

    // instantiate every store once so an empty database opens cleanly
    HashDataStore::open(
        &db_dir.join(HASH_DATA_STORE_DIR),
        OpenMode::Create,
        settings.sector_size,
        settings.max_source_offset_pairs,
    )?;
    HashIndexStore::open(
        &db_dir.join(HASH_STORE_DIR),
        OpenMode::Create,
        settings.hash_prefix_bits,
        settings.hash_suffix_bytes,
    )?;
    SourceDataStore::open(&db_dir.join(SOURCE_DATA_STORE_DIR), OpenMode::Create)?;
    SourceIdStore::open(&db_dir.join(SOURCE_ID_STORE_DIR), OpenMode::Create)?;
    SourceNameStore::open(&db_dir.join(SOURCE_NAME_STORE_DIR), OpenMode::Create)?;

    Logger::open(db_dir, command)?;
    info!(path = %db_dir.display(), "created database");
    Ok(())
}

/// Write-side façade over one database
pub struct ImportManager {
    settings: Settings,
    hash_data: HashDataStore,
    hash_index: HashIndexStore,
    source_id: SourceIdStore,
    source_data: SourceDataStore,
    source_name: SourceNameStore,
    logger: Logger,
    /// Write lock and session tallies in one: taking the counters takes
    /// the lock
    changes: Mutex<Changes>,
}

impl ImportManager {
    /// Open an existing database for importing
    pub fn open(db_dir: &Path, command: &str) -> Result<Self> {
        let settings = read_settings(db_dir)?;
        let manager = Self {
            hash_data: HashDataStore::open(
                &db_dir.join(HASH_DATA_STORE_DIR),
                OpenMode::ReadWrite,
                settings.sector_size,
                settings.max_source_offset_pairs,
            )?,
            hash_index: HashIndexStore::open(
                &db_dir.join(HASH_STORE_DIR),
                OpenMode::ReadWrite,
                settings.hash_prefix_bits,
                settings.hash_suffix_bytes,
            )?,
            source_id: SourceIdStore::open(&db_dir.join(SOURCE_ID_STORE_DIR), OpenMode::ReadWrite)?,
            source_data: SourceDataStore::open(
                &db_dir.join(SOURCE_DATA_STORE_DIR),
                OpenMode::ReadWrite,
            )?,
            source_name: SourceNameStore::open(
                &db_dir.join(SOURCE_NAME_STORE_DIR),
                OpenMode::ReadWrite,
            )?,
            logger: Logger::open(db_dir, command)?,
            settings,
            changes: Mutex::new(Changes::new()),
        };
        Ok(manager)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Record a (repository name, filename) pair for a source
    pub fn insert_source_name(
        &self,
        file_hash: &[u8],
        repository_name: &str,
        filename: &str,
    ) -> Result<()> {
        let mut changes = self.changes.lock();
        let (is_new, source_id) = self.source_id.intern(file_hash, &mut changes)?;
        self.source_name
            .insert(source_id, repository_name, filename, &mut changes)?;
        if is_new {
            // keep the source resolvable before its data arrives
            self.source_data
                .insert(file_hash, &SourceData::default(), &mut changes)?;
        }
        Ok(())
    }

    /// Record or update the attributes of a source
    pub fn insert_source_data(&self, file_hash: &[u8], data: &SourceData) -> Result<()> {
        let mut changes = self.changes.lock();
        self.source_id.intern(file_hash, &mut changes)?;
        self.source_data.insert(file_hash, data, &mut changes)?;
        Ok(())
    }

    /// Record one observation of a block hash within a source file
    pub fn insert_hash(
        &self,
        hash: &[u8],
        file_hash: &[u8],
        file_offset: u64,
        entropy: u64,
        block_label: &str,
    ) -> Result<()> {
        let mut changes = self.changes.lock();
        let (is_new, source_id) = self.source_id.intern(file_hash, &mut changes)?;
        let count = self
            .hash_data
            .insert(hash, source_id, file_offset, entropy, block_label, &mut changes)?;
        if count > 0 {
            self.hash_index.insert(hash, &mut changes)?;
        }
        if is_new {
            self.source_data
                .insert(file_hash, &SourceData::default(), &mut changes)?;
        }
        Ok(())
    }

    /// Smallest interned source file hash; used to enumerate preexisting
    /// sources before a merge
    pub fn first_source(&self) -> Result<Option<Vec<u8>>> {
        self.source_id.first_source()
    }

    /// Source file hash following `last`
    pub fn next_source(&self, last: &[u8]) -> Result<Option<Vec<u8>>> {
        self.source_id.next_source(last)
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

    /// Snapshot of the session tallies so far
    pub fn changes(&self) -> Changes {
        self.changes.lock().clone()
    }

    /// Flush the session record to the log and close the database.
    /// Returns the tallied changes.
    pub fn finish(self) -> Result<Changes> {
        let changes = self.changes.into_inner();
        self.logger.changes(&changes)?;
        self.logger.timestamp("end")?;
        info!("import session closed");
        Ok(changes)
    }
}
