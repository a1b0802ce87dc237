//! Error types for blockdb
//!
//! This module defines the error hierarchy for the library:
//! - Storage engine errors (fatal, the store is considered corrupt)
//! - Record encoding errors (fatal, a record failed to decode)
//! - Input validation errors (reported to the caller, no state change)
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - Policy outcomes (source at max, data unchanged, ...) are NOT errors;
//!   they are tallied in [`crate::changes::Changes`]
//! - Programming errors (zero source id, empty key, stepping a cursor past
//!   the end) panic rather than propagate

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the blockdb library
#[derive(Error, Debug)]
pub enum DbError {
    /// Storage engine failure. The affected store is considered corrupt.
    #[error("storage engine error: {0}")]
    Engine(#[from] rocksdb::Error),

    /// A stored record failed to decode
    #[error("corrupt record encoding: {0}")]
    CorruptEncoding(String),

    /// Invalid hexadecimal input
    #[error("invalid hex string '{0}'")]
    BadHex(String),

    /// Settings file missing, unreadable, or wrong version
    #[error("settings error: {0}")]
    Settings(String),

    /// Database directory does not exist
    #[error("no database at '{}'", path.display())]
    NotFound { path: PathBuf },

    /// Database directory already exists
    #[error("database already exists at '{}'", path.display())]
    AlreadyExists { path: PathBuf },

    /// Malformed user input (import records, command arguments)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// JSON parse or serialize failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors (settings file, log file, import streams)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for DbError
pub type Result<T> = std::result::Result<T, DbError>;

impl DbError {
    /// Shorthand for a corrupt-encoding error with context
    pub fn corrupt(context: impl Into<String>) -> Self {
        DbError::CorruptEncoding(context.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::BadHex("zz".to_string());
        assert_eq!(err.to_string(), "invalid hex string 'zz'");

        let err = DbError::corrupt("varint overruns record");
        assert!(err.to_string().contains("varint overruns record"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: DbError = io.into();
        assert!(matches!(err, DbError::Io(_)));
    }
}
