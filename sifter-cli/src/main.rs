use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use sifter::{column_help, SiftError, SiftOptions};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Scan file trees, filter and compare the entries, and write snapshots
#[derive(Parser, Debug)]
#[command(name = "sifter", version)]
#[command(override_usage = "sifter [OPTIONS] [ROOT | : ]...")]
#[command(after_help = after_help())]
struct Cli {
    /// Scan roots. Roots after a ":" argument belong to the right side;
    /// "-" reads a snapshot from standard input
    #[arg(value_name = "ROOT")]
    roots: Vec<String>,

    /// Load options from a TOML file; command line options are added on top
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Output columns (default: ostp)
    #[arg(short = 'c', long, value_name = "COLUMNS", help_heading = "Selection")]
    columns: Vec<String>,

    /// Sort output using these columns; prefix a column with '/' to reverse
    #[arg(short = 's', long, value_name = "COLUMNS", help_heading = "Selection")]
    sort: Vec<String>,

    /// Columns used to match entries (default: psto)
    #[arg(short = 'k', long, value_name = "COLUMNS", help_heading = "Selection")]
    key: Vec<String>,

    /// Add md5 to the compare key and output
    #[arg(short = '5', long, help_heading = "Selection")]
    md5: bool,

    /// Add sha256 to the compare key and output
    #[arg(short = '2', long, help_heading = "Selection")]
    sha256: bool,

    /// Add sha512 to the compare key and output
    #[arg(short = 'A', long, help_heading = "Selection")]
    sha512: bool,

    /// Add sha1 to the compare key and output
    #[arg(short = '1', long, help_heading = "Selection")]
    sha1: bool,

    /// Filter entries before indexing
    #[arg(short = 'e', long, value_name = "FILTER", help_heading = "Pre-analysis filtering")]
    prefilter: Vec<String>,

    /// Shortcut for --prefilter 'base*=*PAT*'
    #[arg(short = 'b', long, value_name = "PAT", help_heading = "Pre-analysis filtering")]
    base_match: Vec<String>,

    /// Skip files and directory trees whose name matches this glob
    #[arg(short = 'x', long, value_name = "GLOB", help_heading = "Pre-analysis filtering")]
    exclude: Vec<String>,

    /// Only consider regular files while scanning
    #[arg(short = 'R', long, help_heading = "Pre-analysis filtering")]
    regular_only: bool,

    /// Follow symbolic links while scanning
    #[arg(short = 'L', long, help_heading = "Pre-analysis filtering")]
    follow_links: bool,

    /// Don't descend into directories on other file systems
    #[arg(short = 'X', long, help_heading = "Pre-analysis filtering")]
    xdev: bool,

    /// Filter output after analysis
    #[arg(short = 'f', long, value_name = "FILTER", help_heading = "Post-analysis filtering")]
    postfilter: Vec<String>,

    /// Filter output by membership, one or more of lrLR
    #[arg(short = 'm', long, value_name = "CODES", help_heading = "Post-analysis filtering")]
    membership: Option<String>,

    /// Show differing entries only; shortcut for -mLR
    #[arg(short = 'd', long, help_heading = "Post-analysis filtering")]
    diff: bool,

    /// Don't check file roots for a snapshot header
    #[arg(long = "nodetect", help_heading = "Post-analysis filtering")]
    no_detect: bool,

    /// Write output to this file instead of standard output
    #[arg(short = 'o', long = "out", value_name = "PATH", help_heading = "Output")]
    output: Option<PathBuf>,

    /// Fail if any left entry has no match on the right
    #[arg(short = 'Y', long, help_heading = "Output")]
    verify: bool,

    /// Only output the summary, no entry lines
    #[arg(short = 'S', long = "summary", help_heading = "Output")]
    summary_only: bool,

    /// Only output entries, no header or footer
    #[arg(short = 'p', long, help_heading = "Output")]
    plain: bool,

    /// Like --plain, with fields and lines separated by NUL characters
    #[arg(short = '0', long, help_heading = "Output")]
    plain0: bool,

    /// Group numeric digits with ','
    #[arg(short = 'G', long = "group-nums", help_heading = "Output")]
    group_numerics: bool,

    /// Don't report comparisons against missing values
    #[arg(short = 'N', long, help_heading = "Output")]
    ignore_nulls: bool,

    /// Output in JSON format
    #[arg(short = 'J', long = "json-out", help_heading = "Output")]
    json: bool,

    /// Format output times in this zone: UTC, Local or +HH:MM (default: UTC)
    #[arg(short = 'Z', long = "out-zone", value_name = "ZONE", help_heading = "Output")]
    output_timezone: Option<String>,

    /// Increase verbosity
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity
    #[arg(short = 'q', long, action = ArgAction::Count)]
    quiet: u8,
}

fn after_help() -> String {
    format!(
        "COLUMNS codes (example: 'size,mtime,path' can be shortened to 'stp'):\n  {}",
        column_help().join("\n  ")
    )
}

impl Cli {
    fn verbosity(&self) -> i32 {
        i32::from(self.verbose) - i32::from(self.quiet)
    }

    /// Fold the command line into `options`: lists are appended, flags
    /// switched on, single values replaced
    fn apply(self, options: &mut SiftOptions) {
        let mut right = false;
        for root in self.roots {
            if root == ":" {
                right = true;
            } else {
                options.add_root(right, root);
            }
        }

        options.columns.extend(self.columns);
        options.sort.extend(self.sort);
        options.key.extend(self.key);
        options.prefilter.extend(self.prefilter);
        options.postfilter.extend(self.postfilter);
        options.base_match.extend(self.base_match);
        options.excludes.extend(self.exclude);

        options.md5 |= self.md5;
        options.sha1 |= self.sha1;
        options.sha256 |= self.sha256;
        options.sha512 |= self.sha512;
        options.regular_only |= self.regular_only;
        options.follow_links |= self.follow_links;
        options.xdev |= self.xdev;
        options.no_detect |= self.no_detect;
        options.verify |= self.verify;
        options.summary_only |= self.summary_only;
        options.plain |= self.plain;
        options.plain0 |= self.plain0;
        options.group_numerics |= self.group_numerics;
        options.ignore_nulls |= self.ignore_nulls;
        options.json |= self.json;

        if self.diff {
            options.membership = Some("LR".to_string());
        }
        if self.membership.is_some() {
            options.membership = self.membership;
        }
        if self.output.is_some() {
            options.output = self.output;
        }
        if self.output_timezone.is_some() {
            options.output_timezone = self.output_timezone;
        }
        options.verbosity += i32::from(self.verbose) - i32::from(self.quiet);
    }
}

fn init_tracing(verbosity: i32) {
    let level = match verbosity {
        i32::MIN..=0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("sifter={}", level))),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run(cli: Cli, command_line: &str) -> Result<i32> {
    let mut options = match &cli.config {
        Some(path) => SiftOptions::load(path)
            .with_context(|| format!("Can't load configuration from {}", path.display()))?,
        None => SiftOptions::default(),
    };
    cli.apply(&mut options);
    debug!(?options, "Parsed command line");

    let outcome = sifter::sift(&options, command_line)?;
    Ok(outcome.exit_code)
}

/// Lines printed for a fatal error. Configuration mistakes also point at
/// the help text.
fn fatal_message(error: &anyhow::Error) -> Vec<String> {
    let mut lines = vec![format!("Error: {:#}", error)];
    let is_config = error
        .chain()
        .any(|cause| cause.downcast_ref::<SiftError>().is_some_and(SiftError::is_config_error));
    if is_config {
        lines.push("Run 'sifter --help' for the options and column names".to_string());
    }
    lines
}

fn main() {
    let command_line = std::env::args().collect::<Vec<_>>().join(" ");
    let cli = Cli::parse();
    init_tracing(cli.verbosity());

    match run(cli, &command_line) {
        Ok(code) => process::exit(code),
        Err(e) => {
            for line in fatal_message(&e) {
                eprintln!("{}", line);
            }
            process::exit(2);
        }
    }
}
