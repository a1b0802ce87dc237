//! CLI argument parsing using clap derive macros

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Content-addressed block-hash database
#[derive(Parser, Debug)]
#[command(
    name = "blockdb",
    version,
    about = "Content-addressed block-hash database with bulk import, scan, and set algebra",
    long_about = "Maps cryptographic block hashes to metadata and source references.\n\n\
                  A database is a directory of ordered key-value stores. Importers \
                  attribute block hashes to source files; scanners look hashes up and \
                  expand their sources; set-algebra commands merge, intersect, and \
                  subtract whole databases.",
    after_help = "EXAMPLES:\n    \
        blockdb create db\n    \
        blockdb import_tab db blocks.tab -r repo1\n    \
        blockdb scan_hash db d2c0b80a40f6eda6cab16268ecd8b7b1\n    \
        blockdb intersect db_a db_b db_out\n    \
        blockdb histogram db"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Verbose output (show debug logging)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "snake_case")]
pub enum Command {
    /// Create a new database
    Create {
        /// Database directory to create; must not exist yet
        db: PathBuf,

        /// Sector size file offsets must align to
        #[arg(long, default_value = "512", value_name = "BYTES")]
        sector_size: u32,

        /// Size of the hashed blocks
        #[arg(long, default_value = "512", value_name = "BYTES")]
        block_size: u32,

        /// Maximum source references kept per hash; 0 is unbounded
        #[arg(short = 'm', long, default_value = "100000", value_name = "NUM")]
        max_source_offset_pairs: u32,

        /// Hash prefix bits used by the lookup accelerator
        #[arg(long, default_value = "28", value_name = "BITS")]
        hash_prefix_bits: u32,

        /// Hash suffix bytes stored by the lookup accelerator
        #[arg(long, default_value = "3", value_name = "BYTES")]
        hash_suffix_bytes: u32,
    },

    /// Import tab-delimited hash lines: file hash, block hash, 1-based sector index
    ImportTab {
        db: PathBuf,
        /// Tab-delimited input file
        tab_file: PathBuf,
        /// Repository name to attribute sources to (default: derived from the file name)
        #[arg(short = 'r', long, value_name = "NAME")]
        repository: Option<String>,
    },

    /// Import line-oriented JSON records
    ImportJson {
        db: PathBuf,
        /// JSON input file
        json_file: PathBuf,
    },

    /// Export the database as line-oriented JSON: sources, then hashes
    ExportJson {
        db: PathBuf,
        /// Output file; '-' writes to stdout
        json_file: PathBuf,
    },

    /// Copy database A into C
    Add { db_a: PathBuf, db_c: PathBuf },

    /// Merge several databases into the last one named
    AddMultiple {
        /// Two or more producer databases followed by the destination
        #[arg(required = true, num_args = 2..)]
        dbs: Vec<PathBuf>,
    },

    /// Copy only references whose source carries the repository name
    AddRepository {
        db_a: PathBuf,
        db_c: PathBuf,
        repository: String,
    },

    /// Copy only references whose source carries another repository name
    SubtractRepository {
        db_a: PathBuf,
        db_c: PathBuf,
        repository: String,
    },

    /// Copy references present in both A and B into C
    Intersect {
        db_a: PathBuf,
        db_b: PathBuf,
        db_c: PathBuf,
    },

    /// Copy all of A's references for hashes that occur in B
    IntersectHash {
        db_a: PathBuf,
        db_b: PathBuf,
        db_c: PathBuf,
    },

    /// Copy references of A that are absent from B
    Subtract {
        db_a: PathBuf,
        db_b: PathBuf,
        db_c: PathBuf,
    },

    /// Copy all of A's references for hashes absent from B
    SubtractHash {
        db_a: PathBuf,
        db_b: PathBuf,
        db_c: PathBuf,
    },

    /// Copy only hashes with a single source reference
    Deduplicate { db_a: PathBuf, db_c: PathBuf },

    /// Scan a file of "<forensic path>\t<block hash hex>" lines
    Scan {
        db: PathBuf,
        /// Hash list file
        hashes_file: PathBuf,
    },

    /// Scan one hash and print its expansion
    ScanHash {
        db: PathBuf,
        /// Block hash in hex
        hex_hash: String,
    },

    /// Print per-store record counts
    Sizes { db: PathBuf },

    /// Print every source as a JSON line
    Sources { db: PathBuf },

    /// Print the duplicate-count histogram
    Histogram { db: PathBuf },

    /// Print hashes with exactly the given reference count
    Duplicates { db: PathBuf, number: u64 },

    /// Print every hash that references the given source
    HashTable {
        db: PathBuf,
        /// Source file hash in hex
        hex_file_hash: String,
    },

    /// Insert random hashes for performance analysis
    AddRandom {
        db: PathBuf,
        count: u64,
        /// Seed for the hash generator
        #[arg(long, default_value = "0", value_name = "SEED")]
        seed: u64,
    },

    /// Scan random hashes for performance analysis
    ScanRandom {
        db: PathBuf,
        count: u64,
        /// Seed for the hash generator
        #[arg(long, default_value = "1", value_name = "SEED")]
        seed: u64,
    },

    /// Insert the same hash repeatedly for performance analysis
    AddSame { db: PathBuf, count: u64 },

    /// Scan the same hash repeatedly for performance analysis
    ScanSame { db: PathBuf, count: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn test_subcommand_names_are_snake_case() {
        let args =
            CliArgs::try_parse_from(["blockdb", "import_tab", "db", "file.tab", "-r", "repo"])
                .unwrap();
        match args.command {
            Command::ImportTab { repository, .. } => {
                assert_eq!(repository.as_deref(), Some("repo"));
            }
            other => panic!("parsed wrong command: {:?}", other),
        }

        assert!(CliArgs::try_parse_from(["blockdb", "import-tab", "db", "f"]).is_err());
    }

    #[test]
    fn test_add_multiple_requires_two_databases() {
        assert!(CliArgs::try_parse_from(["blockdb", "add_multiple", "only-one"]).is_err());
        let args = CliArgs::try_parse_from(["blockdb", "add_multiple", "a", "b", "c"]).unwrap();
        match args.command {
            Command::AddMultiple { dbs } => assert_eq!(dbs.len(), 3),
            other => panic!("parsed wrong command: {:?}", other),
        }
    }
}
