//! Performance analysis helpers
//!
//! Bulk-insert and bulk-scan commands for timing runs: random hashes,
//! and one hash repeated with advancing offsets. The random generator is
//! passed in explicitly so runs are reproducible from a seed.

use crate::codec::bin_to_hex;
use crate::error::Result;
use crate::import::ImportManager;
use crate::scan::ScanManager;
use rand::Rng;
use std::io::Write;

/// Length of generated block hashes
const RANDOM_HASH_LEN: usize = 16;

/// The fixed hash the `same` helpers hammer on
pub const SAME_HASH: [u8; 16] = [
    0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00,
];

/// File hash of the synthetic source the helpers import under
const HELPER_SOURCE: [u8; 1] = [0x00];

fn random_hash(rng: &mut impl Rng) -> Vec<u8> {
    let mut hash = vec![0u8; RANDOM_HASH_LEN];
    rng.fill(hash.as_mut_slice());
    hash
}

/// Insert `count` random hashes under one synthetic source
pub fn add_random(manager: &ImportManager, count: u64, rng: &mut impl Rng) -> Result<()> {
    let sector_size = u64::from(manager.settings().sector_size);
    manager.insert_source_name(&HELPER_SOURCE, "add_random_repository_name", "add_random_filename")?;

    for i in 0..count {
        manager.insert_hash(&random_hash(rng), &HELPER_SOURCE, i * sector_size, 0, "")?;
    }
    Ok(())
}

/// Scan `count` random hashes; matches are printed and counted
pub fn scan_random(
    scan: &ScanManager,
    count: u64,
    rng: &mut impl Rng,
    out: &mut impl Write,
) -> Result<u64> {
    let mut matches = 0;
    for _ in 0..count {
        let hash = random_hash(rng);
        if let Some(expanded) = scan.find_expanded_hash(&hash)? {
            writeln!(out, "Match found, hash {}: {}", bin_to_hex(&hash), expanded)?;
            matches += 1;
        }
    }
    Ok(matches)
}

/// Insert the same hash `count` times with advancing offsets
pub fn add_same(manager: &ImportManager, count: u64) -> Result<()> {
    let sector_size = u64::from(manager.settings().sector_size);
    manager.insert_source_name(&HELPER_SOURCE, "add_same_repository_name", "add_same_filename")?;

    for i in 0..count {
        manager.insert_hash(&SAME_HASH, &HELPER_SOURCE, i * sector_size, 0, "")?;
    }
    Ok(())
}

/// Scan the same hash `count` times; misses are printed and counted
pub fn scan_same(scan: &ScanManager, count: u64, out: &mut impl Write) -> Result<u64> {
    let mut misses = 0;
    for _ in 0..count {
        if scan.find_expanded_hash(&SAME_HASH)?.is_none() {
            writeln!(out, "Match not found, hash {}", bin_to_hex(&SAME_HASH))?;
            misses += 1;
        }
    }
    Ok(misses)
}
