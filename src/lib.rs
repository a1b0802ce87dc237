//! blockdb - Content-Addressed Block-Hash Database
//!
//! A persistent store that maps cryptographic block hashes (MD5, SHA-1,
//! SHA-256 in binary form) to per-hash metadata and the set of source
//! files the block was observed in. Built for bulk import, random-access
//! scan, ordered iteration, and set algebra between whole databases.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     importers / scanners                     │
//! └──────────────┬───────────────────────────────┬───────────────┘
//!                │ writes                        │ reads
//!                ▼                               ▼
//!       ┌─────────────────┐             ┌─────────────────┐
//!       │  ImportManager  │             │   ScanManager   │
//!       │  (write mutex)  │             │ (seen-set memo) │
//!       └────────┬────────┘             └────────┬────────┘
//!                │                               │
//!                ▼                               ▼
//!   ┌──────────────────────────────────────────────────────┐
//!   │                     store layer                      │
//!   │  hash_data   hash_index   source_id   source_data    │
//!   │  (core)      (neg filter) (interning) source_name    │
//!   └──────────────────────────┬───────────────────────────┘
//!                              │
//!                              ▼
//!                  ┌──────────────────────┐
//!                  │  RocksDB, one per    │
//!                  │  store subdirectory  │
//!                  └──────────────────────┘
//! ```
//!
//! The hash data store is the core: a single-reference hash packs into
//! one record, and a hash seen from several places expands into a
//! metadata head plus one record per reference, all under one key. The
//! set-algebra layer in [`ops`] streams two or more databases in hash
//! order to add, intersect, subtract, or deduplicate them into a third.
//!
//! # Example
//!
//! ```no_run
//! use blockdb::import::{create_database, ImportManager};
//! use blockdb::scan::ScanManager;
//! use blockdb::settings::Settings;
//! use std::path::Path;
//!
//! # fn main() -> blockdb::error::Result<()> {
//! let db = Path::new("demo.hdb");
//! create_database(db, &Settings::default(), "create demo.hdb")?;
//!
//! let import = ImportManager::open(db, "import demo")?;
//! import.insert_hash(b"\xd2\xc0\xb8\x0a", b"\x01\x01", 0, 7, "txt")?;
//! import.finish()?;
//!
//! let scan = ScanManager::open(db)?;
//! if let Some(text) = scan.find_expanded_hash(b"\xd2\xc0\xb8\x0a")? {
//!     println!("{}", text);
//! }
//! # Ok(())
//! # }
//! ```

pub mod changes;
pub mod codec;
pub mod config;
pub mod error;
pub mod import;
pub mod ingest;
pub mod logger;
pub mod ops;
pub mod progress;
pub mod scan;
pub mod settings;
pub mod store;

pub use changes::Changes;
pub use error::{DbError, Result};
pub use import::{create_database, ImportManager};
pub use scan::{HashMatch, ScanManager};
pub use settings::Settings;
