//! Tab-delimited import
//!
//! Line format: `<file hash hex>\t<block hash hex>\t<sector index>`.
//! The sector index is 1-based; the tab format fixes 512-byte sectors.
//! Comment lines starting with `#` and empty lines are skipped;
//! malformed lines are diagnosed on stderr and skipped.

use crate::codec::hex_to_bin;
use crate::error::Result;
use crate::import::ImportManager;
use std::io::BufRead;
use tracing::warn;

/// Sector size the tab exchange format is defined against
const TAB_SECTOR_SIZE: u64 = 512;

/// Outcome of a tab import
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TabImportStats {
    pub imported: u64,
    pub skipped: u64,
}

/// Import a tab-delimited stream. Every line attributes one block hash
/// to one source; the source is named (repository_name, filename) on
/// first sight.
pub fn import_tab(
    manager: &ImportManager,
    repository_name: &str,
    filename: &str,
    reader: impl BufRead,
) -> Result<TabImportStats> {
    let mut stats = TabImportStats::default();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_number = index + 1;
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut fields = line.split('\t');
        let (Some(file_hex), Some(block_hex), Some(index_text)) =
            (fields.next(), fields.next(), fields.next())
        else {
            diagnose(line_number, &line, "expected three tab-separated fields");
            stats.skipped += 1;
            continue;
        };

        let Some(file_hash) = hex_to_bin(file_hex).filter(|h| !h.is_empty()) else {
            diagnose(line_number, &line, "invalid file hash");
            stats.skipped += 1;
            continue;
        };
        let Some(block_hash) = hex_to_bin(block_hex).filter(|h| !h.is_empty()) else {
            diagnose(line_number, &line, "invalid block hash");
            stats.skipped += 1;
            continue;
        };
        // 1-based sector index
        let sector_index = match index_text.parse::<u64>() {
            Ok(value) if value >= 1 => value,
            _ => {
                diagnose(line_number, &line, "invalid sector index");
                stats.skipped += 1;
                continue;
            }
        };
        let file_offset = (sector_index - 1) * TAB_SECTOR_SIZE;

        manager.insert_source_name(&file_hash, repository_name, filename)?;
        manager.insert_hash(&block_hash, &file_hash, file_offset, 0, "")?;
        stats.imported += 1;
    }
    Ok(stats)
}

fn diagnose(line_number: usize, line: &str, reason: &str) {
    warn!(line_number, reason, "skipping malformed tab line");
    eprintln!("{} on line {}: '{}'", reason, line_number, line);
}
