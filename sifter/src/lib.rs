//! File Sifter Library
//!
//! Scan, filter, cross-match and snapshot file tree metadata:
//! - Directory scanning into sparse, column-indexed file entries
//! - Filter expressions with prune checks for the directory walker
//! - Match and redundancy analysis between a left and a right side
//! - Snapshot files that can be read back in place of a scan
//! - Aligned text, NUL-separated and JSON output with run statistics

pub mod column;
pub mod comparator;
pub mod digest;
pub mod engine;
pub mod entry;
pub mod error;
pub mod filter;
pub mod matcher;
pub mod options;
pub mod output;
pub mod report;
pub mod scanner;
pub mod snapshot;
pub mod stats;
pub mod writer;

// Re-export main types and functions
pub use column::{column_help, parse_column_list, Column, ColumnRef};
pub use comparator::EntryComparator;
pub use digest::Digester;
pub use engine::{RunOutcome, Sifter};
pub use entry::{FileEntry, Value};
pub use error::{Result, SiftError};
pub use filter::{compile_args, Filter, FilterArg};
pub use matcher::{MatchAnalyzer, MatchOptions, MatchSummary};
pub use options::{ColumnSelector, RunPlan, SiftOptions};
pub use report::Report;
pub use scanner::{DirectoryScanner, ScanOptions, ScanSink, ScannedFile};
pub use snapshot::{SnapshotEvent, SnapshotReader, MAGIC_HEADER};
pub use stats::{Phase, RunStats};
pub use writer::{EntryWriter, OutputZone, WriterOptions};

use std::io::BufRead;
use std::path::Path;

/// Run with the given options, writing to standard output (or the
/// configured output file)
pub fn sift(options: &SiftOptions, command_line: &str) -> Result<RunOutcome> {
    engine::run(options, command_line)
}

/// Scan a directory tree and return every entry, with `columns` filled in
/// besides path and size. Problems with single files are skipped.
pub fn scan_directory(
    path: impl AsRef<Path>,
    options: ScanOptions,
    columns: &[Column],
) -> Result<Vec<FileEntry>> {
    let mut scanner = DirectoryScanner::new(options, columns)?;
    let mut sink = CollectSink::default();
    scanner.scan(path.as_ref(), &mut sink)?;
    Ok(sink.entries)
}

/// Read every entry of a snapshot. Rows with problems are dropped.
pub fn read_snapshot<R: BufRead>(reader: R) -> Result<Vec<FileEntry>> {
    let mut entries = Vec::new();
    SnapshotReader::new().read_from(reader, |event| {
        if let SnapshotEvent::Entry(entry) = event {
            entries.push(entry);
        }
    })?;
    Ok(entries)
}

#[derive(Default)]
struct CollectSink {
    entries: Vec<FileEntry>,
}

impl ScanSink for CollectSink {
    fn descend(&mut self, _dir: &FileEntry) -> bool {
        true
    }

    fn accept(&mut self, file: ScannedFile) -> bool {
        self.entries.push(file.entry);
        true
    }

    fn warning(&mut self, message: String) {
        tracing::warn!(%message, "Scan warning");
    }

    fn error(&mut self, message: String) {
        tracing::warn!(%message, "Scan error");
    }
}

#[cfg(test)]
mod matcher_tests;
#[cfg(test)]
mod entry_property_tests;
#[cfg(test)]
mod integration_tests;
