//! blockdb - Content-addressed block-hash database
//!
//! Entry point for the CLI application.

use anyhow::{bail, Context, Result};
use blockdb::codec::{bin_to_hex, hex_to_bin};
use blockdb::config::{CliArgs, Command};
use blockdb::import::{create_database, ImportManager};
use blockdb::ingest;
use blockdb::ops::{self, add_multiple, for_each_hash, Adder, SetAdder};
use blockdb::progress::{format_number, print_summary, ProgressReporter};
use blockdb::scan::ScanManager;
use blockdb::settings::{read_settings, Settings};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = CliArgs::parse();
    setup_logging(args.verbose)?;

    // the command line, as recorded in database logs
    let command_string = std::env::args().collect::<Vec<_>>().join(" ");
    let quiet = args.quiet;

    match args.command {
        Command::Create {
            db,
            sector_size,
            block_size,
            max_source_offset_pairs,
            hash_prefix_bits,
            hash_suffix_bytes,
        } => {
            let settings = Settings {
                sector_size,
                block_size,
                max_source_offset_pairs,
                hash_prefix_bits,
                hash_suffix_bytes,
                ..Settings::default()
            };
            create_database(&db, &settings, &command_string)
                .context("Failed to create database")?;
            println!("New database created at '{}'.", db.display());
            Ok(())
        }

        Command::ImportTab {
            db,
            tab_file,
            repository,
        } => run_import_tab(&db, &tab_file, repository, &command_string, quiet),

        Command::ImportJson { db, json_file } => {
            run_import_json(&db, &json_file, &command_string, quiet)
        }

        Command::ExportJson { db, json_file } => run_export_json(&db, &json_file),

        Command::Add { db_a, db_c } => {
            run_one_producer(&db_a, &db_c, &command_string, quiet, |adder, hash| {
                adder.add(hash)
            })
        }

        Command::AddRepository {
            db_a,
            db_c,
            repository,
        } => run_one_producer_with_repository(
            &db_a,
            &db_c,
            &repository,
            &command_string,
            quiet,
            |adder, hash| adder.add_repository(hash),
        ),

        Command::SubtractRepository {
            db_a,
            db_c,
            repository,
        } => run_one_producer_with_repository(
            &db_a,
            &db_c,
            &repository,
            &command_string,
            quiet,
            |adder, hash| adder.add_non_repository(hash),
        ),

        Command::Deduplicate { db_a, db_c } => {
            run_one_producer(&db_a, &db_c, &command_string, quiet, |adder, hash| {
                adder.deduplicate(hash)
            })
        }

        Command::Intersect { db_a, db_b, db_c } => {
            run_two_producers(&db_a, &db_b, &db_c, &command_string, quiet, |adder, hash| {
                adder.intersect(hash)
            })
        }

        Command::IntersectHash { db_a, db_b, db_c } => {
            run_two_producers(&db_a, &db_b, &db_c, &command_string, quiet, |adder, hash| {
                adder.intersect_hash(hash)
            })
        }

        Command::Subtract { db_a, db_b, db_c } => {
            run_two_producers(&db_a, &db_b, &db_c, &command_string, quiet, |adder, hash| {
                adder.subtract(hash)
            })
        }

        Command::SubtractHash { db_a, db_b, db_c } => {
            run_two_producers(&db_a, &db_b, &db_c, &command_string, quiet, |adder, hash| {
                adder.subtract_hash(hash)
            })
        }

        Command::AddMultiple { dbs } => run_add_multiple(&dbs, &command_string, quiet),

        Command::Scan { db, hashes_file } => run_scan(&db, &hashes_file, &command_string),

        Command::ScanHash { db, hex_hash } => {
            let hash = parse_hash(&hex_hash)?;
            let scan = ScanManager::open(&db).context("Failed to open database")?;
            match scan.find_expanded_hash(&hash)? {
                Some(text) => println!("{}", text),
                None => println!("Hash not found for '{}'", hex_hash),
            }
            Ok(())
        }

        Command::Sizes { db } => {
            let scan = ScanManager::open(&db).context("Failed to open database")?;
            println!("{}", scan.sizes()?);
            Ok(())
        }

        Command::Sources { db } => {
            let scan = ScanManager::open(&db).context("Failed to open database")?;
            ops::stats::sources(&scan, &mut io::stdout().lock())?;
            Ok(())
        }

        Command::Histogram { db } => {
            let scan = ScanManager::open(&db).context("Failed to open database")?;
            let mut out = io::stdout().lock();
            ops::stats::print_header(&mut out, "histogram-command", &command_string)?;
            ops::stats::histogram(&scan, &mut out)?;
            Ok(())
        }

        Command::Duplicates { db, number } => {
            let scan = ScanManager::open(&db).context("Failed to open database")?;
            let mut out = io::stdout().lock();
            ops::stats::print_header(&mut out, "duplicates-command", &command_string)?;
            ops::stats::duplicates(&scan, number, &mut out)?;
            Ok(())
        }

        Command::HashTable { db, hex_file_hash } => {
            let file_hash = parse_hash(&hex_file_hash)?;
            let scan = ScanManager::open(&db).context("Failed to open database")?;
            let mut out = io::stdout().lock();
            match ops::stats::hash_table(&scan, &file_hash, &mut out)? {
                Some(_) => Ok(()),
                None => {
                    println!("There is no source with this file hash");
                    Ok(())
                }
            }
        }

        Command::AddRandom { db, count, seed } => {
            let manager = ImportManager::open(&db, &command_string)
                .context("Failed to open database")?;
            let mut rng = StdRng::seed_from_u64(seed);
            ops::random::add_random(&manager, count, &mut rng)?;
            let changes = manager.finish()?;
            print!("{}", changes);
            Ok(())
        }

        Command::ScanRandom { db, count, seed } => {
            let scan = ScanManager::open(&db).context("Failed to open database")?;
            let mut rng = StdRng::seed_from_u64(seed);
            let matches =
                ops::random::scan_random(&scan, count, &mut rng, &mut io::stdout().lock())?;
            println!("# scan_random completed, {} matches.", matches);
            Ok(())
        }

        Command::AddSame { db, count } => {
            let manager = ImportManager::open(&db, &command_string)
                .context("Failed to open database")?;
            ops::random::add_same(&manager, count)?;
            let changes = manager.finish()?;
            print!("{}", changes);
            Ok(())
        }

        Command::ScanSame { db, count } => {
            let scan = ScanManager::open(&db).context("Failed to open database")?;
            let misses = ops::random::scan_same(&scan, count, &mut io::stdout().lock())?;
            println!("# scan_same completed, {} misses.", misses);
            Ok(())
        }
    }
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("blockdb=debug,warn")
    } else {
        EnvFilter::new("blockdb=warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    Ok(())
}

fn parse_hash(hex: &str) -> Result<Vec<u8>> {
    match hex_to_bin(hex) {
        Some(hash) if !hash.is_empty() => Ok(hash),
        _ => bail!("Invalid hash: '{}'", hex),
    }
}

/// Create the destination of a merge when it does not exist yet, copying
/// the producer's settings
fn create_if_new(dest: &Path, producer: &Path, command_string: &str) -> Result<()> {
    if dest.exists() {
        return Ok(());
    }
    let settings = read_settings(producer).context("Failed to read producer settings")?;
    create_database(dest, &settings, command_string)
        .context("Failed to create destination database")?;
    Ok(())
}

fn progress_reporter(quiet: bool) -> Option<ProgressReporter> {
    if quiet {
        None
    } else {
        Some(ProgressReporter::new())
    }
}

fn run_import_tab(
    db: &Path,
    tab_file: &Path,
    repository: Option<String>,
    command_string: &str,
    quiet: bool,
) -> Result<()> {
    let file = File::open(tab_file)
        .with_context(|| format!("Cannot open {}", tab_file.display()))?;
    let filename = tab_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let repository = repository.unwrap_or_else(|| format!("repository_{}", filename));

    let manager = ImportManager::open(db, command_string).context("Failed to open database")?;
    let progress = progress_reporter(quiet);
    if let Some(ref p) = progress {
        p.set_status("Importing...");
    }

    let started = std::time::Instant::now();
    let stats = ingest::import_tab(&manager, &repository, &filename, BufReader::new(file))?;
    let changes = manager.finish()?;

    if let Some(ref p) = progress {
        p.finish(&format!(
            "Imported {} lines, skipped {}",
            format_number(stats.imported),
            format_number(stats.skipped)
        ));
    }
    print!("{}", changes);
    if !quiet {
        print_summary("Import Complete", db, stats.imported, started.elapsed());
    }
    println!("import_tab completed.");
    Ok(())
}

fn run_import_json(db: &Path, json_file: &Path, command_string: &str, quiet: bool) -> Result<()> {
    let file = File::open(json_file)
        .with_context(|| format!("Cannot open {}", json_file.display()))?;

    let manager = ImportManager::open(db, command_string).context("Failed to open database")?;
    let progress = progress_reporter(quiet);
    if let Some(ref p) = progress {
        p.set_status("Importing...");
    }

    let started = std::time::Instant::now();
    let imported = ingest::import_json(&manager, BufReader::new(file))?;
    let changes = manager.finish()?;

    if let Some(ref p) = progress {
        p.finish(&format!("Imported {} records", format_number(imported)));
    }
    print!("{}", changes);
    if !quiet {
        print_summary("Import Complete", db, imported, started.elapsed());
    }
    println!("import_json completed.");
    Ok(())
}

fn run_export_json(db: &Path, json_file: &Path) -> Result<()> {
    let scan = ScanManager::open(db).context("Failed to open database")?;
    if json_file == Path::new("-") {
        ingest::export_json(&scan, &mut io::stdout().lock())?;
    } else {
        let file = File::create(json_file)
            .with_context(|| format!("Cannot open {}", json_file.display()))?;
        let mut out = io::BufWriter::new(file);
        ingest::export_json(&scan, &mut out)?;
        out.flush()?;
    }
    println!("export_json completed.");
    Ok(())
}

fn run_one_producer<F>(
    db_a: &Path,
    db_c: &Path,
    command_string: &str,
    quiet: bool,
    mut op: F,
) -> Result<()>
where
    F: FnMut(&mut Adder, &[u8]) -> blockdb::Result<()>,
{
    create_if_new(db_c, db_a, command_string)?;
    let producer = ScanManager::open(db_a).context("Failed to open source database")?;
    let consumer =
        ImportManager::open(db_c, command_string).context("Failed to open destination")?;
    let mut adder = Adder::new(&producer, &consumer)?;

    let visited = drive(&producer, quiet, |hash| op(&mut adder, hash))?;
    let changes = consumer.finish()?;
    print!("{}", changes);
    println!("# processed {} hashes.", format_number(visited));
    Ok(())
}

fn run_one_producer_with_repository<F>(
    db_a: &Path,
    db_c: &Path,
    repository: &str,
    command_string: &str,
    quiet: bool,
    mut op: F,
) -> Result<()>
where
    F: FnMut(&mut Adder, &[u8]) -> blockdb::Result<()>,
{
    create_if_new(db_c, db_a, command_string)?;
    let producer = ScanManager::open(db_a).context("Failed to open source database")?;
    let consumer =
        ImportManager::open(db_c, command_string).context("Failed to open destination")?;
    let mut adder = Adder::with_repository(&producer, &consumer, repository)?;

    let visited = drive(&producer, quiet, |hash| op(&mut adder, hash))?;
    let changes = consumer.finish()?;
    print!("{}", changes);
    println!("# processed {} hashes.", format_number(visited));
    Ok(())
}

fn run_two_producers<F>(
    db_a: &Path,
    db_b: &Path,
    db_c: &Path,
    command_string: &str,
    quiet: bool,
    mut op: F,
) -> Result<()>
where
    F: FnMut(&mut SetAdder, &[u8]) -> blockdb::Result<()>,
{
    create_if_new(db_c, db_a, command_string)?;
    let producer_a = ScanManager::open(db_a).context("Failed to open database A")?;
    let producer_b = ScanManager::open(db_b).context("Failed to open database B")?;
    let consumer =
        ImportManager::open(db_c, command_string).context("Failed to open destination")?;
    let mut adder = SetAdder::new(&producer_a, &producer_b, &consumer)?;

    let visited = drive(&producer_a, quiet, |hash| op(&mut adder, hash))?;
    let changes = consumer.finish()?;
    print!("{}", changes);
    println!("# processed {} hashes.", format_number(visited));
    Ok(())
}

fn run_add_multiple(dbs: &[PathBuf], command_string: &str, quiet: bool) -> Result<()> {
    let (dest, producer_dirs) = dbs
        .split_last()
        .expect("clap enforces at least two databases");
    create_if_new(dest, &producer_dirs[0], command_string)?;

    let mut producers = Vec::new();
    for dir in producer_dirs {
        producers.push(ScanManager::open(dir).context("Failed to open source database")?);
    }
    let consumer =
        ImportManager::open(dest, command_string).context("Failed to open destination")?;

    let progress = progress_reporter(quiet);
    if let Some(ref p) = progress {
        p.set_status("Merging...");
    }
    let visited = add_multiple(&producers, &consumer)?;
    let changes = consumer.finish()?;
    if let Some(ref p) = progress {
        p.finish(&format!("Merged {} hashes", format_number(visited)));
    }
    print!("{}", changes);
    Ok(())
}

/// Iterate a producer's hashes through `op`, with progress reporting
fn drive<F>(producer: &ScanManager, quiet: bool, mut op: F) -> Result<u64>
where
    F: FnMut(&[u8]) -> blockdb::Result<()>,
{
    let progress = progress_reporter(quiet);
    let mut seen = 0u64;
    let visited = for_each_hash(producer, |hash| {
        seen += 1;
        if let Some(ref p) = progress {
            if seen % 10_000 == 0 {
                p.update("Hashes", seen);
            }
        }
        op(hash)
    })?;
    if let Some(ref p) = progress {
        p.finish(&format!("Processed {} hashes", format_number(visited)));
    }
    Ok(visited)
}

/// Scan a file of "<forensic path>\t<block hash hex>" lines; comment
/// lines are forwarded to stdout, hits print path, hash, and expansion
fn run_scan(db: &Path, hashes_file: &Path, command_string: &str) -> Result<()> {
    let file = File::open(hashes_file)
        .with_context(|| format!("Cannot open {}", hashes_file.display()))?;
    let scan = ScanManager::open(db).context("Failed to open database")?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "# command: '{}'", command_string)?;
    writeln!(out, "# blockdb-Version: {}", env!("CARGO_PKG_VERSION"))?;

    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let line_number = index + 1;
        if line.starts_with('#') {
            writeln!(out, "{}", line)?;
            continue;
        }
        if line.is_empty() {
            continue;
        }

        let Some((forensic_path, hex_hash)) = line.split_once('\t') else {
            eprintln!("Tab not found on line {}: '{}'", line_number, line);
            continue;
        };
        let Some(hash) = hex_to_bin(hex_hash).filter(|h| !h.is_empty()) else {
            eprintln!("Invalid block hash on line {}: '{}'", line_number, line);
            continue;
        };

        if let Some(expanded) = scan.find_expanded_hash(&hash)? {
            writeln!(out, "{}\t{}\t{}", forensic_path, bin_to_hex(&hash), expanded)?;
        }
    }
    writeln!(out, "# scan completed.")?;
    Ok(())
}
