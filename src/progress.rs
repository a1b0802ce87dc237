//! Progress reporting for long-running commands
//!
//! Provides a spinner-based status display using indicatif, plus the
//! end-of-run summary printer.

use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

/// Progress reporter for imports and merges
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .expect("Invalid progress template")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Report progress through a record stream
    pub fn update(&self, label: &str, count: u64) {
        self.bar
            .set_message(format!("{}: {}", label, format_number(count)));
    }

    /// Finish the display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Total size of a database directory on disk
fn database_size(path: &Path) -> Option<u64> {
    fn walk(path: &Path, total: &mut u64) {
        if let Ok(entries) = std::fs::read_dir(path) {
            for entry in entries.flatten() {
                if let Ok(meta) = entry.metadata() {
                    if meta.is_dir() {
                        walk(&entry.path(), total);
                    } else {
                        *total += meta.len();
                    }
                }
            }
        }
    }

    if !path.is_dir() {
        return None;
    }
    let mut total = 0;
    walk(path, &mut total);
    Some(total)
}

/// Print a summary after a write-side command completes
pub fn print_summary(title: &str, db_path: &Path, records: u64, elapsed: Duration) {
    println!();
    println!("{}", style(title).green().bold());
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Records:").bold(), format_number(records));
    println!(
        "  {} {:.1}s",
        style("Duration:").bold(),
        elapsed.as_secs_f64()
    );
    if let Some(size) = database_size(db_path) {
        println!(
            "  {} {} ({})",
            style("Database:").bold(),
            db_path.display(),
            format_size(size, BINARY)
        );
    } else {
        println!("  {} {}", style("Database:").bold(), db_path.display());
    }
    println!();
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}
