//! Snapshot text format: field escaping and the streaming reader.
//!
//! A snapshot starts with [`MAGIC_HEADER`]. Lines starting with `|` are
//! directives; the only one that matters to the reader is
//! `| Columns: name,name,...`, which sets the columns of the data rows that
//! follow. A data row holds one escaped field per column, separated by runs
//! of unescaped spaces. The last field runs to the end of the line.

use std::borrow::Cow;
use std::fs::File;
use std::io::{self, BufRead, Read};
use std::path::Path;

use tracing::debug;

use crate::column::{parse_column_list, Column};
use crate::entry::FileEntry;
use crate::error::{Result, SiftError};

/// First line of every snapshot
pub const MAGIC_HEADER: &str = "| File Sifter output file - V1 |";

/// Escape a field for a snapshot row. `None` is a null value. Only the last
/// column may contain bare spaces.
pub fn escape_field(value: Option<&str>, last_column: bool) -> String {
    match value {
        None => "\\~".to_string(),
        Some("") => "\\-".to_string(),
        Some(text) if last_column => text.replace('\\', "\\\\"),
        Some(text) => text.replace('\\', "\\\\").replace(' ', "\\ "),
    }
}

/// Undo [`escape_field`]. Returns `None` for a null value. Fields in the
/// last column are taken literally apart from the null and empty tokens.
pub fn unescape_field(field: &str, last_column: bool) -> Option<String> {
    if !field.contains('\\') {
        return Some(field.to_string());
    }
    match field {
        "\\-" => Some(String::new()),
        "\\~" => None,
        _ if last_column => Some(field.to_string()),
        _ => {
            let mut out = String::with_capacity(field.len());
            let mut chars = field.chars();
            while let Some(c) = chars.next() {
                if c == '\\' {
                    match chars.next() {
                        Some(escaped) => out.push(escaped),
                        None => out.push(c),
                    }
                } else {
                    out.push(c);
                }
            }
            Some(out)
        }
    }
}

/// Parse a `| Columns: ...` directive. Returns `Ok(None)` for any other line.
pub fn parse_columns_directive(line: &str) -> Result<Option<Vec<Column>>> {
    let Some(rest) = line.strip_prefix('|') else {
        return Ok(None);
    };
    let Some(rest) = rest.trim_start().strip_prefix("Columns:") else {
        return Ok(None);
    };
    if !rest.starts_with(char::is_whitespace) {
        return Ok(None);
    }
    let list = rest.trim();
    if list.is_empty() || !list.chars().all(|c| c.is_alphanumeric() || c == '_' || c == ',') {
        return Ok(None);
    }
    let columns = parse_column_list(list, false)?;
    Ok(Some(columns.into_iter().map(|c| c.column).collect()))
}

/// Split a data row into `count` raw (still escaped) fields.
///
/// Leading spaces before each field are skipped. Every field but the last
/// ends at the first space not preceded by a backslash. Returns `None` if the
/// line runs out before the last field.
///
/// A backslash always escapes the character after it, so an escaped
/// backslash followed by a space (`a\\ b`) ends the field after `a\\`.
/// This keeps splitting the exact inverse of [`escape_field`].
pub fn split_fields(line: &str, count: usize) -> Option<Vec<&str>> {
    let mut fields = Vec::with_capacity(count);
    let mut rest = line;
    for i in 0..count {
        rest = rest.trim_start_matches(' ');
        if i + 1 == count {
            fields.push(rest);
            break;
        }
        let bytes = rest.as_bytes();
        let mut j = 0;
        let end = loop {
            match bytes.get(j) {
                None => return None,
                Some(b'\\') => j += 2,
                Some(b' ') => break j,
                Some(_) => j += 1,
            }
        };
        fields.push(&rest[..end]);
        rest = &rest[end..];
    }
    Some(fields)
}

/// True if `bytes` starts with the snapshot magic header
pub fn has_magic_header(bytes: &[u8]) -> bool {
    bytes.starts_with(MAGIC_HEADER.as_bytes())
}

/// Check whether the file at `path` starts with the snapshot magic header.
/// Files shorter than the header are not snapshots.
pub fn detect_snapshot(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let mut buf = vec![0u8; MAGIC_HEADER.len()];
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => return Ok(false),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(has_magic_header(&buf))
}

/// Something the reader produced from one line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotEvent {
    /// A data row, possibly with some fields left unset
    Entry(FileEntry),
    /// A problem to report; the run continues
    Problem(String),
}

/// Streaming snapshot parser. Feed it lines in order.
#[derive(Debug, Default)]
pub struct SnapshotReader {
    columns: Vec<Column>,
    line_number: usize,
    rows: usize,
}

impl SnapshotReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Columns set by the most recent Columns directive
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Number of data rows turned into entries so far
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Parse one line (without its line terminator).
    ///
    /// A data row before any Columns directive is an error for the whole
    /// input. A row missing a field delimiter is reported and dropped; a
    /// field that can't be parsed is reported and left unset.
    pub fn read_line<F>(&mut self, line: &str, sink: &mut F) -> Result<()>
    where
        F: FnMut(SnapshotEvent),
    {
        self.line_number += 1;
        if line.starts_with('|') {
            if let Some(columns) = parse_columns_directive(line)
                .map_err(|e| SiftError::snapshot_error(self.line_number, e.to_string()))?
            {
                debug!(columns = ?columns, "Snapshot columns");
                self.columns = columns;
            }
            return Ok(());
        }
        if line.is_empty() {
            return Ok(());
        }
        if self.columns.is_empty() {
            return Err(SiftError::snapshot_error(
                self.line_number,
                "No column names were defined before data entries",
            ));
        }

        let Some(fields) = split_fields(line, self.columns.len()) else {
            sink(SnapshotEvent::Problem(format!(
                "Could not find delimiter in snapshot line {}",
                self.line_number
            )));
            return Ok(());
        };

        let last = self.columns.len() - 1;
        let mut entry = FileEntry::new();
        for (i, (&column, raw)) in self.columns.iter().zip(fields).enumerate() {
            let Some(text) = unescape_field(raw, i == last) else {
                continue;
            };
            if let Err(e) = entry.parse_and_set(column, &text) {
                sink(SnapshotEvent::Problem(format!(
                    "Parse error in snapshot line {}, column '{}': {}: '{}'",
                    self.line_number, column, e, text
                )));
            }
        }
        self.rows += 1;
        sink(SnapshotEvent::Entry(entry));
        Ok(())
    }

    /// Read every line from `reader`
    pub fn read_from<R, F>(&mut self, mut reader: R, mut sink: F) -> Result<()>
    where
        R: BufRead,
        F: FnMut(SnapshotEvent),
    {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                return Ok(());
            }
            if buf.last() == Some(&b'\n') {
                buf.pop();
                if buf.last() == Some(&b'\r') {
                    buf.pop();
                }
            }
            let line = String::from_utf8_lossy(&buf);
            if matches!(line, Cow::Owned(_)) {
                sink(SnapshotEvent::Problem(format!(
                    "Invalid UTF-8 in snapshot line {}; bytes were replaced",
                    self.line_number + 1
                )));
            }
            self.read_line(&line, &mut sink)?;
        }
    }
}
