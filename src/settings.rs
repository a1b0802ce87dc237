//! Persistent database settings
//!
//! Settings are written once when a database is created and never change.
//! Opening a database requires the settings file to be present and carry
//! the expected version; anything else fails loudly.

use crate::error::{DbError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Name of the settings file inside a database directory
pub const SETTINGS_FILENAME: &str = "settings.json";

/// The settings version this crate reads and writes
pub const CURRENT_SETTINGS_VERSION: u32 = 3;

/// Database tuning parameters, fixed at creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Version of the settings record
    pub settings_version: u32,

    /// Minimal alignment of file offsets, in bytes. Offsets are stored
    /// divided by this value.
    pub sector_size: u32,

    /// Size of the hashed data blocks, in bytes
    pub block_size: u32,

    /// Maximum number of (source id, file offset) pairs kept per hash.
    /// 0 disables the cap.
    pub max_source_offset_pairs: u32,

    /// Number of leading hash bits used as the key of the hash index store
    pub hash_prefix_bits: u32,

    /// Number of trailing hash bytes stored as the hash index value
    pub hash_suffix_bytes: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            settings_version: CURRENT_SETTINGS_VERSION,
            sector_size: 512,
            block_size: 512,
            max_source_offset_pairs: 100_000,
            hash_prefix_bits: 28,
            hash_suffix_bytes: 3,
        }
    }
}

impl Settings {
    /// Render the settings as a single JSON line
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("settings serialization is infallible")
    }

    /// Validate parameter ranges before creating a database
    pub fn validate(&self) -> Result<()> {
        if self.sector_size == 0 {
            return Err(DbError::Settings("sector_size must be nonzero".into()));
        }
        if self.block_size == 0 {
            return Err(DbError::Settings("block_size must be nonzero".into()));
        }
        if self.hash_prefix_bits == 0 {
            return Err(DbError::Settings("hash_prefix_bits must be nonzero".into()));
        }
        Ok(())
    }
}

/// Write the settings file into a database directory. The file must not
/// already exist.
pub fn write_settings(db_dir: &Path, settings: &Settings) -> Result<()> {
    settings.validate()?;
    let path = db_dir.join(SETTINGS_FILENAME);
    if path.exists() {
        return Err(DbError::Settings(format!(
            "settings already present at '{}'",
            path.display()
        )));
    }
    fs::write(&path, settings.to_json() + "\n")?;
    Ok(())
}

/// Read and validate the settings file of an existing database
pub fn read_settings(db_dir: &Path) -> Result<Settings> {
    if !db_dir.is_dir() {
        return Err(DbError::NotFound {
            path: db_dir.to_path_buf(),
        });
    }
    let path = db_dir.join(SETTINGS_FILENAME);
    let text = fs::read_to_string(&path).map_err(|e| {
        DbError::Settings(format!("cannot read '{}': {}", path.display(), e))
    })?;
    let settings: Settings = serde_json::from_str(&text)
        .map_err(|e| DbError::Settings(format!("cannot parse '{}': {}", path.display(), e)))?;
    if settings.settings_version != CURRENT_SETTINGS_VERSION {
        return Err(DbError::Settings(format!(
            "unsupported settings version {} (expected {})",
            settings.settings_version, CURRENT_SETTINGS_VERSION
        )));
    }
    settings.validate()?;
    Ok(settings)
}
