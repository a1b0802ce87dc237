//! JSON import and export
//!
//! The exchange format is one JSON object per line, two record shapes:
//!
//! - source: `{"file_hash":"<hex>","filesize":n,"file_type":"...",
//!   "nonprobative_count":n,"name_pairs":["repo","file",...]}`
//! - hash: `{"block_hash":"<hex>","entropy":n,"block_label":"...",
//!   "source_offset_pairs":["<hex>",offset,...]}`
//!
//! Export streams every source first, then every hash, so an import of
//! the stream rebuilds source attributes before hash references arrive.

use crate::codec::{bin_to_hex, hex_to_bin};
use crate::error::{DbError, Result};
use crate::import::ImportManager;
use crate::scan::ScanManager;
use crate::store::SourceData;
use serde_json::Value;
use std::io::{BufRead, Write};
use tracing::warn;

/// Render one source as its export record. None when the file hash is
/// unknown.
pub fn source_to_json(scan: &ScanManager, file_hash: &[u8]) -> Result<Option<String>> {
    let Some(data) = scan.find_source_data(file_hash)? else {
        return Ok(None);
    };
    let mut name_pairs = Vec::new();
    for (repository_name, filename) in scan.find_source_names(file_hash)?.unwrap_or_default() {
        name_pairs.push(Value::from(repository_name));
        name_pairs.push(Value::from(filename));
    }
    let record = serde_json::json!({
        "file_hash": bin_to_hex(file_hash),
        "filesize": data.filesize,
        "file_type": data.file_type,
        "nonprobative_count": data.nonprobative_count,
        "name_pairs": name_pairs,
    });
    Ok(Some(record.to_string()))
}

/// Render one hash as its export record. None when the hash is absent.
pub fn hash_to_json(scan: &ScanManager, hash: &[u8]) -> Result<Option<String>> {
    let Some(matched) = scan.find_hash(hash)? else {
        return Ok(None);
    };
    let mut source_offset_pairs = Vec::new();
    for (file_hash, file_offset) in &matched.pairs {
        source_offset_pairs.push(Value::from(bin_to_hex(file_hash)));
        source_offset_pairs.push(Value::from(*file_offset));
    }
    let record = serde_json::json!({
        "block_hash": bin_to_hex(hash),
        "entropy": matched.entropy,
        "block_label": matched.block_label,
        "source_offset_pairs": source_offset_pairs,
    });
    Ok(Some(record.to_string()))
}

/// Export the whole database: sources first, then hashes
pub fn export_json(scan: &ScanManager, out: &mut impl Write) -> Result<()> {
    let mut cursor = scan.source_begin()?;
    while let Some(file_hash) = cursor {
        let record = source_to_json(scan, &file_hash)?
            .expect("source iteration yielded an unknown source");
        writeln!(out, "{}", record)?;
        cursor = scan.source_next(&file_hash)?;
    }

    let mut cursor = scan.hash_begin()?;
    while let Some(hash) = cursor {
        let record =
            hash_to_json(scan, &hash)?.expect("hash iteration yielded an unknown hash");
        writeln!(out, "{}", record)?;
        cursor = scan.hash_next(&hash)?;
    }
    Ok(())
}

fn require_hex(value: &Value, field: &str) -> Result<Vec<u8>> {
    let text = value
        .as_str()
        .ok_or_else(|| DbError::InvalidInput(format!("invalid {} field", field)))?;
    let bytes =
        hex_to_bin(text).ok_or_else(|| DbError::BadHex(text.to_string()))?;
    if bytes.is_empty() {
        return Err(DbError::InvalidInput(format!("empty {} field", field)));
    }
    Ok(bytes)
}

fn optional_u64(record: &Value, field: &str) -> Result<u64> {
    match record.get(field) {
        None => Ok(0),
        Some(value) => value
            .as_u64()
            .ok_or_else(|| DbError::InvalidInput(format!("invalid {} field", field))),
    }
}

fn optional_str<'a>(record: &'a Value, field: &str) -> Result<&'a str> {
    match record.get(field) {
        None => Ok(""),
        Some(value) => value
            .as_str()
            .ok_or_else(|| DbError::InvalidInput(format!("invalid {} field", field))),
    }
}

/// Import one JSON record; the record shape is keyed by the presence of
/// `block_hash` vs `file_hash`
pub fn import_json_record(manager: &ImportManager, line: &str) -> Result<()> {
    let record: Value = serde_json::from_str(line)
        .map_err(|_| DbError::InvalidInput("invalid JSON syntax".to_string()))?;
    if !record.is_object() {
        return Err(DbError::InvalidInput("not a JSON object".to_string()));
    }

    if let Some(block_hash) = record.get("block_hash") {
        let hash = require_hex(block_hash, "block_hash")?;
        let entropy = optional_u64(&record, "entropy")?;
        let block_label = optional_str(&record, "block_label")?;

        let pairs = record
            .get("source_offset_pairs")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                DbError::InvalidInput("invalid source_offset_pairs field".to_string())
            })?;
        for pair in pairs.chunks_exact(2) {
            let file_hash = require_hex(&pair[0], "source hash")?;
            let file_offset = pair[1].as_u64().ok_or_else(|| {
                DbError::InvalidInput("invalid file offset in source_offset_pairs".to_string())
            })?;
            manager.insert_hash(&hash, &file_hash, file_offset, entropy, block_label)?;
        }
        Ok(())
    } else if let Some(file_hash) = record.get("file_hash") {
        let file_hash = require_hex(file_hash, "file_hash")?;
        let data = SourceData {
            filesize: optional_u64(&record, "filesize")?,
            file_type: optional_str(&record, "file_type")?.to_string(),
            nonprobative_count: optional_u64(&record, "nonprobative_count")?,
        };
        manager.insert_source_data(&file_hash, &data)?;

        let name_pairs = record
            .get("name_pairs")
            .and_then(Value::as_array)
            .ok_or_else(|| DbError::InvalidInput("invalid name_pairs field".to_string()))?;
        for pair in name_pairs.chunks_exact(2) {
            let repository_name = pair[0].as_str().ok_or_else(|| {
                DbError::InvalidInput("invalid repository name in name_pairs".to_string())
            })?;
            let filename = pair[1].as_str().ok_or_else(|| {
                DbError::InvalidInput("invalid filename in name_pairs".to_string())
            })?;
            manager.insert_source_name(&file_hash, repository_name, filename)?;
        }
        Ok(())
    } else {
        Err(DbError::InvalidInput(
            "a block_hash or file_hash field is required".to_string(),
        ))
    }
}

/// Import a line-oriented JSON stream. Comment and empty lines are
/// skipped; malformed lines are diagnosed and skipped. Returns the
/// number of records imported.
pub fn import_json(manager: &ImportManager, reader: impl BufRead) -> Result<u64> {
    let mut imported = 0;
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_number = index + 1;
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match import_json_record(manager, &line) {
            Ok(()) => imported += 1,
            Err(DbError::InvalidInput(reason)) | Err(DbError::BadHex(reason)) => {
                warn!(line_number, %reason, "skipping malformed JSON record");
                eprintln!("Invalid JSON on line {}: {}", line_number, reason);
            }
            Err(other) => return Err(other),
        }
    }
    Ok(imported)
}
