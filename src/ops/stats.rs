//! Statistics commands
//!
//! Read-only reports over one database: store sizes, the source listing,
//! the duplicate-count histogram, hashes with a given duplicate count,
//! and the per-source hash table.

use crate::codec::bin_to_hex;
use crate::error::Result;
use crate::ingest::json::source_to_json;
use crate::scan::ScanManager;
use std::collections::BTreeMap;
use std::io::Write;

/// Print the `# command:` header the statistics reports carry
pub fn print_header(out: &mut impl Write, report: &str, command: &str) -> Result<()> {
    writeln!(out, "# {}-Version: {}", report, env!("CARGO_PKG_VERSION"))?;
    writeln!(out, "# command: '{}'", command)?;
    Ok(())
}

/// One JSON line per source, in file hash order
pub fn sources(scan: &ScanManager, out: &mut impl Write) -> Result<u64> {
    let mut listed = 0;
    let mut cursor = scan.source_begin()?;
    while let Some(file_hash) = cursor {
        let record = source_to_json(scan, &file_hash)?
            .expect("source iteration yielded an unknown source");
        writeln!(out, "{}", record)?;
        listed += 1;
        cursor = scan.source_next(&file_hash)?;
    }
    Ok(listed)
}

/// Duplicate-count histogram: totals line first, then one line per
/// distinct count, ascending
pub fn histogram(scan: &ScanManager, out: &mut impl Write) -> Result<()> {
    let mut total_hashes: u64 = 0;
    let mut total_distinct: u64 = 0;
    let mut counts: BTreeMap<u64, u64> = BTreeMap::new();

    let mut cursor = scan.hash_begin()?;
    while let Some(hash) = cursor {
        let count = scan.find_hash_count(&hash)?;
        total_hashes += count;
        total_distinct += 1;
        *counts.entry(count).or_insert(0) += 1;
        cursor = scan.hash_next(&hash)?;
    }

    writeln!(
        out,
        "{{\"total_hashes\":{},\"total_distinct_hashes\":{}}}",
        total_hashes, total_distinct
    )?;
    for (duplicates, distinct_hashes) in counts {
        writeln!(
            out,
            "{{\"duplicates\":{},\"distinct_hashes\":{},\"total\":{}}}",
            duplicates,
            distinct_hashes,
            duplicates * distinct_hashes
        )?;
    }
    Ok(())
}

/// Print every hash with exactly `number` references, with its expansion
pub fn duplicates(scan: &ScanManager, number: u64, out: &mut impl Write) -> Result<u64> {
    let mut found = 0;
    let mut cursor = scan.hash_begin()?;
    while let Some(hash) = cursor {
        if scan.find_hash_count(&hash)? == number {
            let expanded = scan
                .find_expanded_hash(&hash)?
                .expect("hash iteration yielded an unknown hash");
            writeln!(out, "{}\t{}", bin_to_hex(&hash), expanded)?;
            found += 1;
        }
        cursor = scan.hash_next(&hash)?;
    }
    if found == 0 {
        writeln!(out, "No hashes were found with this count.")?;
    }
    Ok(found)
}

/// Print every hash that references the given source, with its expansion.
/// Returns None when the source is unknown.
pub fn hash_table(scan: &ScanManager, file_hash: &[u8], out: &mut impl Write) -> Result<Option<u64>> {
    if scan.find_source_data(file_hash)?.is_none() {
        return Ok(None);
    }

    let mut found = 0;
    let mut cursor = scan.hash_begin()?;
    while let Some(hash) = cursor {
        let matched = scan
            .find_hash(&hash)?
            .expect("hash iteration yielded an unknown hash");
        if matched.pairs.iter().any(|(fh, _)| fh == file_hash) {
            let expanded = scan.find_expanded_hash(&hash)?.unwrap_or_default();
            writeln!(out, "{}\t{}", bin_to_hex(&hash), expanded)?;
            found += 1;
        }
        cursor = scan.hash_next(&hash)?;
    }
    Ok(Some(found))
}
