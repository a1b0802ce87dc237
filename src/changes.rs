//! Change counters
//!
//! Every upsert resolves to exactly one policy outcome per store it
//! touches. The import manager tallies those outcomes here and reports
//! them when it closes. Policy outcomes are never errors.

use serde::Serialize;
use std::fmt;

/// Tallies for each upsert outcome, reported at import close
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Changes {
    // hash data store
    pub hash_data_data_inserted: u64,
    pub hash_data_data_same: u64,
    pub hash_data_data_changed: u64,
    pub hash_data_source_inserted: u64,
    pub hash_data_source_already_present: u64,
    pub hash_data_source_at_max: u64,
    pub hash_data_invalid_file_offset: u64,

    // hash index store
    pub hash_prefix_inserted: u64,
    pub hash_suffix_inserted: u64,

    // source data store
    pub source_data_inserted: u64,
    pub source_data_same: u64,
    pub source_data_changed: u64,

    // source id store
    pub source_id_inserted: u64,
    pub source_id_already_present: u64,

    // source name store
    pub source_name_inserted: u64,
    pub source_name_already_present: u64,
}

impl Changes {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no counter moved
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn counters(&self) -> [(&'static str, u64); 16] {
        [
            ("hash_data_data_inserted", self.hash_data_data_inserted),
            ("hash_data_data_same", self.hash_data_data_same),
            ("hash_data_data_changed", self.hash_data_data_changed),
            ("hash_data_source_inserted", self.hash_data_source_inserted),
            (
                "hash_data_source_already_present",
                self.hash_data_source_already_present,
            ),
            ("hash_data_source_at_max", self.hash_data_source_at_max),
            (
                "hash_data_invalid_file_offset",
                self.hash_data_invalid_file_offset,
            ),
            ("hash_prefix_inserted", self.hash_prefix_inserted),
            ("hash_suffix_inserted", self.hash_suffix_inserted),
            ("source_data_inserted", self.source_data_inserted),
            ("source_data_same", self.source_data_same),
            ("source_data_changed", self.source_data_changed),
            ("source_id_inserted", self.source_id_inserted),
            ("source_id_already_present", self.source_id_already_present),
            ("source_name_inserted", self.source_name_inserted),
            (
                "source_name_already_present",
                self.source_name_already_present,
            ),
        ]
    }
}

impl fmt::Display for Changes {
    /// Report nonzero counters, one per line, in the original report shape
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# database changes:")?;
        if self.is_empty() {
            return writeln!(f, "No changes.");
        }
        for (name, value) in self.counters() {
            if value != 0 {
                writeln!(f, "#     {}: {}", name, value)?;
            }
        }
        Ok(())
    }
}
