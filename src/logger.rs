//! Database operation log
//!
//! Every database directory carries an append-only `log.txt`. Each
//! writing session records the command that ran it, named timestamps,
//! and the change counters it produced.

use crate::changes::Changes;
use crate::error::Result;
use chrono::Utc;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Name of the log file inside a database directory
pub const LOG_FILENAME: &str = "log.txt";

pub struct Logger {
    file: Mutex<File>,
}

impl Logger {
    /// Open the database log for appending and record the command header
    pub fn open(db_dir: &Path, command: &str) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(db_dir.join(LOG_FILENAME))?;
        let logger = Self {
            file: Mutex::new(file),
        };
        logger.write_line(&format!("# command: '{}'", command))?;
        logger.timestamp("begin")?;
        Ok(logger)
    }

    fn write_line(&self, line: &str) -> Result<()> {
        let mut file = self.file.lock();
        writeln!(file, "{}", line)?;
        Ok(())
    }

    /// Record a named timestamp
    pub fn timestamp(&self, name: &str) -> Result<()> {
        debug!(name, "log timestamp");
        self.write_line(&format!("# timestamp {}: {}", name, Utc::now().to_rfc3339()))
    }

    /// Record the change counters of a session
    pub fn changes(&self, changes: &Changes) -> Result<()> {
        let mut file = self.file.lock();
        write!(file, "{}", changes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_log_accumulates_sessions() {
        let dir = tempdir().unwrap();

        {
            let logger = Logger::open(dir.path(), "first command").unwrap();
            logger.timestamp("end").unwrap();
        }
        {
            let logger = Logger::open(dir.path(), "second command").unwrap();
            let changes = Changes {
                hash_data_source_inserted: 1,
                ..Changes::default()
            };
            logger.changes(&changes).unwrap();
        }

        let text = std::fs::read_to_string(dir.path().join(LOG_FILENAME)).unwrap();
        assert!(text.contains("# command: 'first command'"));
        assert!(text.contains("# command: 'second command'"));
        assert!(text.contains("hash_data_source_inserted: 1"));
    }
}
