//! The run pipeline.
//!
//! A [`Sifter`] owns everything one run needs: the compiled plan, the entry
//! collection, statistics and diagnostics. Running it loads every root
//! (scanning directories, reading snapshots), analyzes matches if any
//! requested column depends on them, filters, sorts and writes the result
//! through the background output worker.

use std::env;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::column::Column;
use crate::comparator::EntryComparator;
use crate::digest::Digester;
use crate::entry::FileEntry;
use crate::error::{Result, SiftError};
use crate::filter;
use crate::matcher::{MatchAnalyzer, VERIFY_FAILED};
use crate::options::{RunPlan, SiftOptions};
use crate::output::{display_width, OutputOptions, OutputWorker};
use crate::report::Report;
use crate::scanner::{DirectoryScanner, ScanSink, ScannedFile};
use crate::snapshot::{detect_snapshot, SnapshotEvent, SnapshotReader};
use crate::stats::{Phase, RunStats};
use crate::writer::{EntryWriter, FooterInfo, HeaderInfo};

/// Normal output lines are shown down to this verbosity
const OUTPUT_VERBOSITY: i32 = -1;

/// What a finished run produced
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// 1 if any error was reported, 0 otherwise
    pub exit_code: i32,
    /// Entries that passed the post-filter, in output order
    pub entries: Vec<FileEntry>,
    pub stats: RunStats,
    pub error_count: usize,
    pub warning_count: usize,
    pub null_compares: u64,
}

/// One run of the sifter
pub struct Sifter {
    plan: RunPlan,
    scanner: DirectoryScanner,
    digester: Digester,
    command_line: String,
    stdin: Option<Box<dyn BufRead + Send>>,
    entries: Vec<FileEntry>,
    stats: RunStats,
    report: Report,
}

impl Sifter {
    /// Compile `options` into a run. Fails on any configuration error.
    pub fn new(options: &SiftOptions) -> Result<Self> {
        let plan = options.compile()?;
        let scanner = DirectoryScanner::new(plan.scan.clone(), &plan.needed)?;
        Ok(Self {
            report: Report::new(plan.ignore_nulls),
            plan,
            scanner,
            digester: Digester::new(),
            command_line: String::new(),
            stdin: None,
            entries: Vec::new(),
            stats: RunStats::new(),
        })
    }

    /// Command line echoed in the snapshot header
    pub fn with_command_line(mut self, command_line: impl Into<String>) -> Self {
        self.command_line = command_line.into();
        self
    }

    /// Read the `-` root from this reader instead of standard input
    pub fn with_stdin(mut self, reader: impl BufRead + Send + 'static) -> Self {
        self.stdin = Some(Box::new(reader));
        self
    }

    pub fn plan(&self) -> &RunPlan {
        &self.plan
    }

    /// Run, writing to the configured output file (or standard output) and
    /// standard error
    pub fn run(self) -> Result<RunOutcome> {
        match self.plan.output.clone() {
            Some(path) => {
                let file = File::create(&path)
                    .map_err(|e| SiftError::path_error(&path, format!("Error opening output file: {}", e)))?;
                self.run_with(file, io::stderr())
            }
            None => self.run_with(io::stdout(), io::stderr()),
        }
    }

    /// Run, writing normal output to `stream` and errors and status lines
    /// to `err_stream`. Returns an error only for fatal problems; everything
    /// else is counted in the outcome.
    pub fn run_with<W, E>(mut self, stream: W, err_stream: E) -> Result<RunOutcome>
    where
        W: Write + Send + 'static,
        E: Write + Send + 'static,
    {
        let output = OutputWorker::spawn(
            stream,
            err_stream,
            OutputOptions {
                line_separator: if self.plan.writer.plain0 { "\0" } else { "\n" }.to_string(),
                display_width: display_width(),
                verbosity: self.plan.verbosity,
            },
        )?;
        let result = self.execute(&output);
        let finished = output.finish();
        let outcome = result?;
        finished?;
        Ok(outcome)
    }

    fn execute(&mut self, output: &OutputWorker) -> Result<RunOutcome> {
        let started = Instant::now();
        let start_time = Utc::now();
        info!(
            left = self.plan.left.len(),
            right = self.plan.right.len(),
            "Starting run"
        );

        let mut writer = EntryWriter::new(self.plan.writer.clone());
        let header = HeaderInfo {
            command_line: self.command_line.clone(),
            working_dir: env::current_dir()
                .map(|d| d.display().to_string())
                .unwrap_or_default(),
            compare_keys: self.plan.compare_keys.clone(),
            sort_keys: self.plan.sort_keys.clone(),
            evaluated: self.plan.needed.clone(),
            start_time,
        };
        for line in writer.header_lines(&header) {
            emit(output, line);
        }

        self.load_roots(output)?;
        info!(
            entries = self.entries.len(),
            scanned = self.stats.scanned.total_count(),
            "Roots loaded"
        );

        if self.plan.needs_analysis {
            output.status(0, format!("Analyzing... {} files", self.entries.len()));
            let analyzer = MatchAnalyzer::new(self.plan.compare_keys.clone(), self.plan.match_options);
            let summary = analyzer.analyze(&mut self.entries, &mut self.stats, &mut self.report);
            if summary.verify_failed {
                self.on_error(output, VERIFY_FAILED);
            }
        }

        output.status(0, format!("Filtering and formatting... {}", self.entries.len()));
        let mut kept = Vec::with_capacity(self.entries.len());
        for entry in self.entries.drain(..) {
            let (passed, not_null) = filter::evaluate(self.plan.postfilter.as_ref(), &entry);
            self.report.check_null_compare(not_null);
            if passed {
                writer.measure(&entry);
                kept.push(entry);
            }
        }

        if !self.plan.sort_keys.is_empty() {
            output.status(0, format!("Sorting... ({} entries)", kept.len()));
            let comparator = EntryComparator::new(self.plan.sort_keys.clone());
            comparator.resolve_keys(&mut kept);
            let nulls = comparator.sort(&mut kept);
            self.report.add_null_compares(nulls);
        }

        if let Some(line) = self.report.report_null_compares() {
            warn!(count = self.report.null_compares(), "Null comparisons during run");
            output.error(line);
        }

        let total = kept.len();
        for (i, entry) in kept.iter().enumerate() {
            self.stats.record(Phase::Output, entry.side(), entry.stats_size());
            if self.plan.writer.summary_only {
                continue;
            }
            if self.plan.writer.json {
                match writer.format_json(entry, i + 1 < total) {
                    Ok(lines) => lines.into_iter().for_each(|l| emit(output, l)),
                    Err(e) => self.on_error(output, format!("Error encoding JSON output: {}", e)),
                }
            } else {
                emit(output, writer.format_row(entry));
            }
        }

        let footer = FooterInfo {
            end_time: Utc::now(),
            elapsed: started.elapsed(),
            stats: self.stats.summary_table(
                self.plan.has_left(),
                self.plan.has_right,
                self.plan.writer.group_numerics,
            ),
            diagnostics: self.report.summary_lines(),
        };
        for line in writer.footer_lines(&footer) {
            emit(output, line);
        }

        self.stats.log_summary();
        info!(
            errors = self.report.error_count(),
            warnings = self.report.warning_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Run complete"
        );

        Ok(RunOutcome {
            exit_code: self.report.exit_code(),
            entries: kept,
            stats: self.stats.clone(),
            error_count: self.report.error_count(),
            warning_count: self.report.warning_count(),
            null_compares: self.report.null_compares(),
        })
    }

    fn on_error(&mut self, output: &OutputWorker, msg: impl std::fmt::Display) {
        let line = self.report.error(msg);
        output.error(line);
    }

    /// Load every root, left side first
    fn load_roots(&mut self, output: &OutputWorker) -> Result<()> {
        let mut ingest = Ingest {
            plan: &self.plan,
            output,
            digester: &self.digester,
            entries: &mut self.entries,
            stats: &mut self.stats,
            report: &mut self.report,
            side: false,
        };
        let sides = [(false, &self.plan.left), (true, &self.plan.right)];
        for (side, roots) in sides {
            ingest.side = side;
            for root in roots {
                output.status(0, format!("Processing root... '{}'", root));
                debug!(root = %root, side, "Processing root");
                if root == "-" {
                    let result = match self.stdin.take() {
                        Some(reader) => ingest.load_snapshot(reader),
                        None => ingest.load_snapshot(io::stdin().lock()),
                    };
                    result?;
                } else {
                    ingest.load_path(Path::new(root), &mut self.scanner)?;
                }
            }
        }
        Ok(())
    }
}

fn emit(output: &OutputWorker, line: String) {
    if output.verbosity() >= OUTPUT_VERBOSITY {
        output.line(line);
    }
}

/// Adds entries from one side to the collection
struct Ingest<'a> {
    plan: &'a RunPlan,
    output: &'a OutputWorker,
    digester: &'a Digester,
    entries: &'a mut Vec<FileEntry>,
    stats: &'a mut RunStats,
    report: &'a mut Report,
    side: bool,
}

impl Ingest<'_> {
    fn load_path(&mut self, path: &Path, scanner: &mut DirectoryScanner) -> Result<()> {
        let meta = scanner
            .stat(path)
            .map_err(|e| SiftError::path_error(path, format!("Can't get file information: {}", e)))?;
        if meta.is_dir() {
            scanner.scan(path, self)?;
            return Ok(());
        }
        let is_snapshot = !self.plan.no_detect && meta.is_file() && detect_snapshot(path).unwrap_or(false);
        if is_snapshot {
            let file = File::open(path)
                .map_err(|e| SiftError::path_error(path, format!("Can't open file: {}", e)))?;
            self.load_snapshot(BufReader::new(file))
        } else {
            scanner.scan_file(path, self)
        }
    }

    fn load_snapshot<R: BufRead>(&mut self, reader: R) -> Result<()> {
        let mut snapshot = SnapshotReader::new();
        snapshot.read_from(reader, |event| match event {
            SnapshotEvent::Entry(entry) => {
                self.offer(entry);
            }
            SnapshotEvent::Problem(problem) => self.report_error(problem),
        })?;
        debug!(rows = snapshot.rows(), side = self.side, "Snapshot loaded");
        Ok(())
    }

    /// Tag an entry with its side, count it, and keep it if it passes the
    /// pre-filter
    fn offer(&mut self, mut entry: FileEntry) -> bool {
        if self.plan.needs(Column::Side) {
            entry.set_bool(Column::Side, self.side);
        }
        let size = entry.stats_size();
        self.stats.record(Phase::Scanned, self.side, size);

        let (passed, not_null) = filter::evaluate(self.plan.prefilter.as_ref(), &entry);
        self.report.check_null_compare(not_null);
        if passed {
            self.stats.record(Phase::Indexed, self.side, size);
            self.entries.push(entry);
        }
        passed
    }

    fn add_digests(&mut self, entry: &mut FileEntry, path: &Path, regular: bool) {
        for col in self.plan.digest_columns() {
            if !regular {
                entry.set_string(col, "");
                continue;
            }
            self.output.status(0, format!("{}: {}", col, path.display()));
            match self.digester.digest_file(path, col) {
                Ok(sum) => entry.set_string(col, sum),
                Err(e) => self.report_error(e.to_string()),
            }
        }
    }

    fn report_error(&mut self, msg: String) {
        let line = self.report.error(msg);
        self.output.error(line);
    }
}

impl ScanSink for Ingest<'_> {
    fn descend(&mut self, dir: &FileEntry) -> bool {
        match &self.plan.prefilter {
            Some(f) => {
                let (passed, not_null) = f.evaluate_prune(dir);
                self.report.check_null_compare(not_null);
                passed
            }
            None => true,
        }
    }

    fn accept(&mut self, file: ScannedFile) -> bool {
        let ScannedFile { mut entry, path, regular } = file;
        self.add_digests(&mut entry, &path, regular);
        let kept = self.offer(entry);

        let scanned = &self.stats.scanned;
        self.output.status(
            0,
            format!(
                "Scan({}MB in {}) {}",
                scanned.total_size() / 1_000_000,
                scanned.total_count(),
                path.display()
            ),
        );
        kept
    }

    fn warning(&mut self, message: String) {
        let line = self.report.warning(message);
        self.output.error(line);
    }

    fn error(&mut self, message: String) {
        self.report_error(message);
    }
}

/// Run with `options`, writing to standard output (or the configured output
/// file) and standard error
pub fn run(options: &SiftOptions, command_line: &str) -> Result<RunOutcome> {
    Sifter::new(options)?.with_command_line(command_line).run()
}
