//! Storage layer
//!
//! One store per concern, each owning its RocksDB instance under its own
//! subdirectory of the database:
//!
//! - `engine`: the ordered key-value abstraction the stores share
//! - `hash_data`: block hash -> metadata + source references (the core)
//! - `hash_index`: approximate presence filter over hash prefixes
//! - `source_id`: file hash <-> source id bijection
//! - `source_data`: per-source attributes
//! - `source_name`: source id -> (repository, filename) set

pub mod engine;
pub mod hash_data;
pub mod hash_index;
pub mod source_data;
pub mod source_id;
pub mod source_name;

pub use engine::{OpenMode, PutOutcome};
pub use hash_data::{HashDataStore, HashRecord, Record};
pub use hash_index::HashIndexStore;
pub use source_data::{SourceData, SourceDataStore};
pub use source_id::SourceIdStore;
pub use source_name::SourceNameStore;

/// Store subdirectory names inside a database directory
pub const HASH_DATA_STORE_DIR: &str = "lmdb_hash_data_store";
pub const HASH_STORE_DIR: &str = "lmdb_hash_store";
pub const SOURCE_DATA_STORE_DIR: &str = "lmdb_source_data_store";
pub const SOURCE_ID_STORE_DIR: &str = "lmdb_source_id_store";
pub const SOURCE_NAME_STORE_DIR: &str = "lmdb_source_name_store";
