//! The file entry model: a sparse, column-indexed attribute record.
//!
//! A [`FileEntry`] holds at most one [`Value`] per [`Column`]. A missing
//! value is not the same thing as an empty string or zero: accessors return
//! `None` ("null") when nothing is stored and no derivation rule applies.
//! Derived columns (base name, extension, depth, file type, membership, and
//! the two modification time forms) are computed from the columns they depend
//! on, on every read, so sorting, filtering, and output agree on what a
//! column holds. [`FileEntry::resolve`] writes a derived value back into the
//! record so later reads don't recompute it.

use std::borrow::Cow;
use std::num::ParseIntError;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::column::Column;

/// A stored column value. The variant always agrees with
/// [`Column::is_numeric`] for the column it's stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Text(String),
}

/// A sparse attribute record for one scanned or parsed file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileEntry {
    fields: [Option<Value>; Column::COUNT],
}

impl FileEntry {
    /// Create a new empty file entry
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a string value, replacing any previous (or memoized) value.
    ///
    /// # Panics
    /// If `col` is a numeric column.
    pub fn set_string(&mut self, col: Column, value: impl Into<String>) {
        assert!(!col.is_numeric(), "column '{}' is numeric; cannot store a string", col);
        self.fields[col.index()] = Some(Value::Text(value.into()));
    }

    /// Store a numeric value, replacing any previous (or memoized) value.
    ///
    /// # Panics
    /// If `col` is a string column.
    pub fn set_numeric(&mut self, col: Column, value: i64) {
        assert!(col.is_numeric(), "column '{}' is not numeric; cannot store a number", col);
        self.fields[col.index()] = Some(Value::Int(value));
    }

    /// Store a boolean as 1 or 0 in a numeric column
    pub fn set_bool(&mut self, col: Column, value: bool) {
        self.set_numeric(col, i64::from(value));
    }

    /// The value stored for a column, without derivation
    pub fn stored(&self, col: Column) -> Option<&Value> {
        self.fields[col.index()].as_ref()
    }

    /// True if a value is stored for this column
    pub fn has(&self, col: Column) -> bool {
        self.fields[col.index()].is_some()
    }

    /// Get a string column, deriving it from other columns when possible.
    ///
    /// # Panics
    /// If a numeric value is stored under `col`.
    pub fn get_string(&self, col: Column) -> Option<Cow<'_, str>> {
        match self.stored(col) {
            Some(Value::Text(s)) => Some(Cow::Borrowed(s.as_str())),
            Some(Value::Int(_)) => panic!("column '{}' holds a number, not a string", col),
            None => self.derive_string(col).map(Cow::Owned),
        }
    }

    /// Get a numeric column, deriving it from other columns when possible.
    ///
    /// # Panics
    /// If a string value is stored under `col`.
    pub fn get_numeric(&self, col: Column) -> Option<i64> {
        match self.stored(col) {
            Some(Value::Int(n)) => Some(*n),
            Some(Value::Text(_)) => panic!("column '{}' holds a string, not a number", col),
            None => self.derive_numeric(col),
        }
    }

    /// Get a numeric column as a boolean (nonzero is true)
    pub fn get_bool(&self, col: Column) -> Option<bool> {
        self.get_numeric(col).map(|n| n != 0)
    }

    pub fn numeric_or_zero(&self, col: Column) -> i64 {
        self.get_numeric(col).unwrap_or(0)
    }

    pub fn bool_or_false(&self, col: Column) -> bool {
        self.get_bool(col).unwrap_or(false)
    }

    /// The side this entry belongs to; false = left, true = right
    pub fn side(&self) -> bool {
        self.bool_or_false(Column::Side)
    }

    /// Get any column rendered as text: numbers in decimal, strings as-is
    pub fn get_text(&self, col: Column) -> Option<Cow<'_, str>> {
        if col.is_numeric() {
            self.get_numeric(col).map(|n| Cow::Owned(n.to_string()))
        } else {
            self.get_string(col)
        }
    }

    /// True if this entry's path names a directory (directory paths end in '/')
    pub fn is_dir(&self) -> bool {
        self.get_string(Column::Path)
            .map(|p| p.ends_with('/'))
            .unwrap_or(false)
    }

    /// Size counted toward statistics: directories contribute zero bytes
    /// whatever their cumulative size is.
    pub fn stats_size(&self) -> i64 {
        if self.is_dir() {
            0
        } else {
            self.numeric_or_zero(Column::Size)
        }
    }

    /// Fill in a derived column by writing its computed value into the
    /// record. This is the one place a "read" mutates the entry; stored values
    /// are left untouched. Returns true if the column now holds a value.
    pub fn resolve(&mut self, col: Column) -> bool {
        if self.has(col) {
            return true;
        }
        if col.is_numeric() {
            if let Some(n) = self.derive_numeric(col) {
                self.fields[col.index()] = Some(Value::Int(n));
            }
        } else if let Some(s) = self.derive_string(col) {
            self.fields[col.index()] = Some(Value::Text(s));
        }
        self.has(col)
    }

    /// Set a column from unescaped snapshot text. Numeric columns have any
    /// grouping commas removed before parsing. Dynamic columns are computed
    /// by analysis and are never loaded, so they are ignored.
    pub fn parse_and_set(&mut self, col: Column, text: &str) -> Result<(), ParseIntError> {
        if col.is_dynamic() {
            return Ok(());
        }
        if col.is_numeric() {
            let n = parse_grouped_int(text)?;
            self.set_numeric(col, n);
        } else {
            self.set_string(col, text);
        }
        Ok(())
    }

    fn text_field(&self, col: Column) -> Option<&str> {
        match self.stored(col) {
            Some(Value::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    fn derive_string(&self, col: Column) -> Option<String> {
        match col {
            Column::Base => self.text_field(Column::Path).map(path_base),
            Column::Dir => self.text_field(Column::Path).map(path_dir),
            Column::Ext => self
                .text_field(Column::Path)
                .or_else(|| self.text_field(Column::Base))
                .map(|p| path_ext(p).to_string()),
            Column::Membership => {
                let side = self.get_bool(Column::Side)?;
                let matched = self.get_bool(Column::Matched)?;
                Some(membership_code(side, matched).to_string())
            }
            Column::FileType => self
                .text_field(Column::Modestr)
                .map(|m| modestr_to_filetype(m).to_string()),
            Column::Mtime => match self.stored(Column::Mstamp) {
                Some(Value::Int(stamp)) => mstamp_to_mtime(*stamp),
                _ => None,
            },
            _ => None,
        }
    }

    fn derive_numeric(&self, col: Column) -> Option<i64> {
        match col {
            Column::Mstamp => self.text_field(Column::Mtime).and_then(mtime_to_mstamp),
            Column::Depth => self
                .text_field(Column::Path)
                .map(|p| p.matches('/').count() as i64),
            _ => None,
        }
    }
}

/// Two-character code summarizing an entry's side and matched status
pub fn membership_code(side: bool, matched: bool) -> &'static str {
    match (side, matched) {
        (false, false) => "<!",
        (false, true) => "<=",
        (true, true) => ">=",
        (true, false) => ">!",
    }
}

/// Map a mode string to a one-letter file type. Char devices carry both
/// 'D' and 'c', so 'c' is checked first; a bare 'D' is a block device.
pub fn modestr_to_filetype(modestr: &str) -> &'static str {
    let has = |c: char| modestr.contains(c);
    if has('c') {
        "c"
    } else if has('D') {
        "b"
    } else if has('p') {
        "p"
    } else if has('L') {
        "L"
    } else if has('d') {
        "d"
    } else if has('S') {
        "S"
    } else {
        "f"
    }
}

/// Format a Unix timestamp as an RFC 3339 time string in UTC
pub fn mstamp_to_mtime(stamp: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp(stamp, 0)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Parse an RFC 3339 time string to a Unix timestamp
pub fn mtime_to_mstamp(mtime: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(mtime).ok().map(|t| t.timestamp())
}

/// Parse a base-10 integer, ignoring any grouping commas
pub fn parse_grouped_int(text: &str) -> Result<i64, ParseIntError> {
    if text.contains(',') {
        text.replace(',', "").parse()
    } else {
        text.parse()
    }
}

/// Lexically clean a slash-separated path: collapse repeated slashes, drop
/// `.` elements, resolve `..` against preceding elements.
pub fn clean_path(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ => {
                    if !rooted {
                        parts.push("..");
                    }
                }
            },
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    if rooted {
        format!("/{}", joined)
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Last element of a path; trailing slashes are ignored
pub fn path_base(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    match trimmed.rfind('/') {
        Some(i) => trimmed[i + 1..].to_string(),
        None => trimmed.to_string(),
    }
}

/// Everything but the last element of a path, cleaned
pub fn path_dir(path: &str) -> String {
    let dir = match path.rfind('/') {
        Some(i) => &path[..=i],
        None => "",
    };
    clean_path(dir)
}

/// File name extension: the suffix of the last element starting at its
/// final dot, or empty if there is none
pub fn path_ext(path: &str) -> &str {
    for (i, b) in path.bytes().enumerate().rev() {
        match b {
            b'/' => break,
            b'.' => return &path[i..],
            _ => {}
        }
    }
    ""
}
