//! Run configuration: the options a run is started with, and the plan they
//! compile into.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::column::{format_column_names, parse_column_list, Column, ColumnRef};
use crate::error::{Result, SiftError};
use crate::filter::{compile_many, Filter, FilterArg};
use crate::matcher::MatchOptions;
use crate::scanner::ScanOptions;
use crate::writer::{OutputZone, WriterOptions};

/// Output columns used when none are given
pub const DEFAULT_OUTPUT_COLUMNS: [Column; 4] = [Column::Modestr, Column::Size, Column::Mtime, Column::Path];

/// Compare key used when none is given
pub const DEFAULT_KEY_COLUMNS: [Column; 4] = [Column::Path, Column::Size, Column::Mtime, Column::Modestr];

/// Text of the error for a bad `membership` option
pub const MEMBERSHIP_CODES_ERROR: &str = "--membership filter codes must be one or more of [lrLR]";

/// A column list option with a default.
///
/// Each argument either replaces the list or, when it starts with `+`,
/// inserts its columns into it (starting from the defaults if nothing was set
/// yet). Columns already present are not inserted again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSelector {
    columns: Option<Vec<ColumnRef>>,
    defaults: Vec<ColumnRef>,
    allow_inverse: bool,
}

impl ColumnSelector {
    pub fn new<I>(defaults: I, allow_inverse: bool) -> Self
    where
        I: IntoIterator<Item = Column>,
    {
        Self {
            columns: None,
            defaults: defaults.into_iter().map(ColumnRef::from).collect(),
            allow_inverse,
        }
    }

    /// Apply one column argument. Appended columns go in at `position`;
    /// a negative position counts from the end, so -1 inserts before the
    /// last column.
    pub fn apply(&mut self, position: isize, arg: &str) -> Result<()> {
        let (appending, list) = match arg.strip_prefix('+') {
            Some(rest) => (true, rest),
            None => (false, arg),
        };
        let parsed = parse_column_list(list, self.allow_inverse)?;
        if !appending {
            self.columns = Some(parsed);
            return Ok(());
        }

        let defaults = &self.defaults;
        let columns = self.columns.get_or_insert_with(|| defaults.clone());
        for col in parsed {
            if columns.iter().any(|c| c.column == col.column) {
                continue;
            }
            let len = columns.len() as isize;
            let index = if position < 0 { len + position } else { position.min(len) };
            columns.insert(index.max(0) as usize, col);
        }
        Ok(())
    }

    /// The selected columns; empty if nothing was ever applied
    pub fn columns(&self) -> &[ColumnRef] {
        self.columns.as_deref().unwrap_or(&[])
    }

    /// True once any argument has been applied
    pub fn is_set(&self) -> bool {
        self.columns.is_some()
    }
}

/// Every option of a run. Loaded from a TOML file and/or filled in from
/// the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiftOptions {
    /// Output column arguments, applied in order
    pub columns: Vec<String>,
    /// Sort key arguments, applied in order
    pub sort: Vec<String>,
    /// Compare key arguments, applied in order
    pub key: Vec<String>,
    /// Filter arguments applied while entries are loaded
    pub prefilter: Vec<String>,
    /// Filter arguments applied after analysis
    pub postfilter: Vec<String>,
    /// Roots on the left side; `-` reads a snapshot from standard input
    pub left: Vec<String>,
    /// Roots on the right side
    pub right: Vec<String>,
    pub verbosity: i32,
    /// Statistics only, no entry rows
    pub summary_only: bool,
    /// No header or footer
    pub plain: bool,
    /// Plain output with NUL-separated fields and lines
    pub plain0: bool,
    pub json: bool,
    pub group_numerics: bool,
    pub follow_links: bool,
    pub regular_only: bool,
    pub md5: bool,
    pub sha1: bool,
    pub sha256: bool,
    pub sha512: bool,
    /// Membership codes, one or more of `lrLR`
    pub membership: Option<String>,
    pub ignore_nulls: bool,
    /// Glob patterns matched against base names while scanning
    pub excludes: Vec<String>,
    /// Base name substrings; each adds a `base*=*PAT*` prefilter
    pub base_match: Vec<String>,
    /// Write output here instead of standard output
    pub output: Option<PathBuf>,
    /// Don't check file roots for the snapshot header
    pub no_detect: bool,
    pub xdev: bool,
    /// Report an error if any left entry is unmatched
    pub verify: bool,
    /// `UTC`, `Local` or `+HH:MM`
    pub output_timezone: Option<String>,
}

impl SiftOptions {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load options from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| SiftError::path_error(path, format!("Can't read config file: {}", e)))?;
        let options = Self::from_toml_str(&text)?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(options)
    }

    /// Add a root to the left or right side
    pub fn add_root(&mut self, side: bool, root: impl Into<String>) {
        if side {
            self.right.push(root.into());
        } else {
            self.left.push(root.into());
        }
    }

    /// Compile the options into a run plan. Every configuration error
    /// surfaces here, before any input is read.
    pub fn compile(&self) -> Result<RunPlan> {
        let has_left = !self.left.is_empty();
        let has_right = !self.right.is_empty();

        let mut output = ColumnSelector::new(DEFAULT_OUTPUT_COLUMNS, false);
        let mut sort = ColumnSelector::new([], true);
        let mut key = ColumnSelector::new(DEFAULT_KEY_COLUMNS, false);
        for arg in &self.columns {
            output.apply(-1, arg)?;
        }
        for arg in &self.sort {
            sort.apply(-1, arg)?;
        }
        for arg in &self.key {
            key.apply(-1, arg)?;
        }

        if has_left && has_right {
            output.apply(0, "+membership")?;
        } else {
            output.apply(0, "+")?;
        }
        key.apply(0, "+")?;

        let digests = [
            (self.md5, "+md5"),
            (self.sha1, "+sha1"),
            (self.sha256, "+sha256"),
            (self.sha512, "+sha512"),
        ];
        for (_, arg) in digests.iter().filter(|(on, _)| *on) {
            output.apply(-1, arg)?;
            key.apply(0, arg)?;
        }

        let mut pre_args = self
            .prefilter
            .iter()
            .map(|a| FilterArg::parse(a))
            .collect::<Result<Vec<_>>>()?;
        for pattern in &self.base_match {
            pre_args.push(FilterArg::parse(&format!("base*=*{}*", pattern))?);
        }
        let mut post_args = self
            .postfilter
            .iter()
            .map(|a| FilterArg::parse(a))
            .collect::<Result<Vec<_>>>()?;
        if let Some(codes) = &self.membership {
            post_args.extend(membership_filter_args(codes)?);
        }
        let prefilter = compile_many(pre_args)?;
        let postfilter = compile_many(post_args)?;

        let output_columns: Vec<Column> = output.columns().iter().map(|c| c.column).collect();
        let sort_keys = sort.columns().to_vec();
        let compare_keys = key.columns().to_vec();

        let mut needed = [false; Column::COUNT];
        let mut filter_columns = Vec::new();
        for filter in prefilter.iter().chain(postfilter.iter()) {
            filter.collect_columns(&mut filter_columns);
        }
        for col in output_columns
            .iter()
            .copied()
            .chain(sort_keys.iter().map(|c| c.column))
            .chain(compare_keys.iter().map(|c| c.column))
            .chain(filter_columns)
        {
            needed[col.index()] = true;
        }
        if has_right {
            needed[Column::Matched.index()] = true;
            needed[Column::Side.index()] = true;
        }
        let needed: Vec<Column> = Column::ALL.iter().copied().filter(|c| needed[c.index()]).collect();

        let zone = self
            .output_timezone
            .as_deref()
            .map(str::parse::<OutputZone>)
            .transpose()?;

        let left = if !has_left && !has_right {
            vec![".".to_string()]
        } else {
            self.left.clone()
        };

        let needs = |c: Column| needed.contains(&c);
        let plan = RunPlan {
            needs_analysis: needs(Column::Matched) || needs(Column::Redundancy) || needs(Column::RedunIdx),
            match_options: MatchOptions {
                redundancy_index: needs(Column::RedunIdx),
                verify: self.verify,
            },
            scan: ScanOptions {
                follow_links: self.follow_links,
                regular_only: self.regular_only,
                xdev: self.xdev,
                excludes: self.excludes.clone(),
            },
            writer: WriterOptions {
                columns: output_columns.clone(),
                plain: self.plain || self.plain0,
                plain0: self.plain0,
                json: self.json,
                summary_only: self.summary_only,
                group_numerics: self.group_numerics,
                zone,
            },
            output_columns,
            sort_keys,
            compare_keys,
            prefilter,
            postfilter,
            needed,
            left,
            right: self.right.clone(),
            has_right,
            ignore_nulls: self.ignore_nulls,
            no_detect: self.no_detect,
            output: self.output.clone(),
            verbosity: self.verbosity,
        };
        debug!(
            output = %format_column_names(plan.output_columns.iter().copied()),
            key = %format_column_names(plan.compare_keys.iter().copied()),
            needed = %format_column_names(plan.needed.iter().copied()),
            analysis = plan.needs_analysis,
            "Compiled run plan"
        );
        Ok(plan)
    }
}

/// Postfilter arguments for membership codes: one equality test per code,
/// ORed together
pub fn membership_filter_args(codes: &str) -> Result<Vec<FilterArg>> {
    let mut leaves = Vec::new();
    for c in codes.chars() {
        let code = match c {
            'L' => "<!",
            'R' => ">!",
            'l' => "<=",
            'r' => ">=",
            _ => return Err(SiftError::Config(MEMBERSHIP_CODES_ERROR.to_string())),
        };
        leaves.push(FilterArg::parse(&format!("membership={}", code))?);
    }
    let mut args: Vec<FilterArg> = (1..leaves.len()).map(|_| FilterArg::Or).collect();
    args.extend(leaves);
    Ok(args)
}

/// Everything a run needs, resolved from [`SiftOptions`]
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub output_columns: Vec<Column>,
    pub sort_keys: Vec<ColumnRef>,
    pub compare_keys: Vec<ColumnRef>,
    pub prefilter: Option<Filter>,
    pub postfilter: Option<Filter>,
    /// Every column the run evaluates, in column order
    pub needed: Vec<Column>,
    /// Left roots; `.` when no roots were given on either side
    pub left: Vec<String>,
    pub right: Vec<String>,
    pub has_right: bool,
    /// Run match analysis
    pub needs_analysis: bool,
    pub match_options: MatchOptions,
    pub scan: ScanOptions,
    pub writer: WriterOptions,
    pub ignore_nulls: bool,
    pub no_detect: bool,
    pub output: Option<PathBuf>,
    pub verbosity: i32,
}

impl RunPlan {
    pub fn needs(&self, col: Column) -> bool {
        self.needed.contains(&col)
    }

    /// Digest columns the run computes, in column order
    pub fn digest_columns(&self) -> Vec<Column> {
        self.needed.iter().copied().filter(|c| c.is_digest()).collect()
    }

    pub fn has_left(&self) -> bool {
        !self.left.is_empty()
    }
}
