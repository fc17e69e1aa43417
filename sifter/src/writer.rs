//! Output formatting: snapshot rows with header and footer directives,
//! plain and NUL-separated rows, and JSON.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Local, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::column::{format_column_names, Column, ColumnRef};
use crate::entry::{mstamp_to_mtime, FileEntry};
use crate::error::{Result, SiftError};
use crate::snapshot::{escape_field, MAGIC_HEADER};

/// Longest command line echoed in the header
const MAX_COMMAND_LINE: usize = 500;

/// Render a number, optionally with `,` between groups of three digits
pub fn format_number(n: i64, group: bool) -> String {
    let digits = n.unsigned_abs().to_string();
    let sign = if n < 0 { "-" } else { "" };
    if !group {
        return format!("{}{}", sign, digits);
    }
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    out.push_str(sign);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Go-style rendering of an elapsed time: `1h2m3.5s`, `250.5ms`, `12µs`
pub fn format_elapsed(d: Duration) -> String {
    fn with_fraction(whole: u128, rem: u128, digits: usize) -> String {
        if rem == 0 {
            whole.to_string()
        } else {
            let frac = format!("{:0width$}", rem, width = digits);
            format!("{}.{}", whole, frac.trim_end_matches('0'))
        }
    }

    let nanos = d.as_nanos();
    match nanos {
        0 => "0s".to_string(),
        1..=999 => format!("{}ns", nanos),
        1_000..=999_999 => format!("{}µs", with_fraction(nanos / 1_000, nanos % 1_000, 3)),
        1_000_000..=999_999_999 => {
            format!("{}ms", with_fraction(nanos / 1_000_000, nanos % 1_000_000, 6))
        }
        _ => {
            let total = d.as_secs();
            let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
            let secs = with_fraction(s as u128, d.subsec_nanos() as u128, 9);
            if h > 0 {
                format!("{}h{}m{}s", h, m, secs)
            } else if m > 0 {
                format!("{}m{}s", m, secs)
            } else {
                format!("{}s", secs)
            }
        }
    }
}

/// Time zone used to render times on output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputZone {
    Utc,
    Local,
    Fixed(FixedOffset),
}

impl FromStr for OutputZone {
    type Err = SiftError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "UTC" | "utc" | "Z" => return Ok(Self::Utc),
            "Local" | "local" => return Ok(Self::Local),
            _ => {}
        }
        let bad = || SiftError::Config(format!("Bad time zone '{}': expected UTC, Local or +HH:MM", s));
        let (sign, rest) = match s.as_bytes().first() {
            Some(b'+') => (1, &s[1..]),
            Some(b'-') => (-1, &s[1..]),
            _ => return Err(bad()),
        };
        let (h, m) = rest.split_once(':').ok_or_else(bad)?;
        let h: i32 = h.parse().map_err(|_| bad())?;
        let m: i32 = m.parse().map_err(|_| bad())?;
        if !(0..60).contains(&m) {
            return Err(bad());
        }
        FixedOffset::east_opt(sign * (h * 3600 + m * 60))
            .map(Self::Fixed)
            .ok_or_else(bad)
    }
}

impl OutputZone {
    /// Render a UTC time as RFC 3339 in this zone
    pub fn format(&self, t: DateTime<Utc>) -> String {
        match self {
            Self::Utc => t.to_rfc3339_opts(SecondsFormat::Secs, true),
            Self::Local => t.with_timezone(&Local).to_rfc3339_opts(SecondsFormat::Secs, true),
            Self::Fixed(offset) => t.with_timezone(offset).to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    /// Re-render an RFC 3339 time string in this zone. Strings that don't
    /// parse are returned unchanged.
    pub fn adjust(&self, mtime: &str) -> String {
        DateTime::parse_from_rfc3339(mtime)
            .map(|t| self.format(t.with_timezone(&Utc)))
            .unwrap_or_else(|_| mtime.to_string())
    }
}

/// How entries are written
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriterOptions {
    /// Output columns, in order
    pub columns: Vec<Column>,
    /// No header or footer
    pub plain: bool,
    /// NUL-separated fields, no padding; implies `plain`
    pub plain0: bool,
    /// JSON array of objects
    pub json: bool,
    /// Statistics only, no entry rows
    pub summary_only: bool,
    /// Group digits with commas
    pub group_numerics: bool,
    /// Zone for rendered times; UTC when unset
    #[serde(skip)]
    pub zone: Option<OutputZone>,
}

/// Values echoed in the snapshot header
#[derive(Debug, Clone)]
pub struct HeaderInfo {
    pub command_line: String,
    pub working_dir: String,
    pub compare_keys: Vec<ColumnRef>,
    pub sort_keys: Vec<ColumnRef>,
    pub evaluated: Vec<Column>,
    pub start_time: DateTime<Utc>,
}

/// Values shown in the footer
#[derive(Debug, Clone)]
pub struct FooterInfo {
    pub end_time: DateTime<Utc>,
    pub elapsed: Duration,
    pub stats: Vec<String>,
    pub diagnostics: Vec<String>,
}

/// Formats entries and the surrounding directives for one run
#[derive(Debug, Clone)]
pub struct EntryWriter {
    options: WriterOptions,
    widths: Vec<usize>,
}

impl EntryWriter {
    pub fn new(mut options: WriterOptions) -> Self {
        if options.plain0 {
            options.plain = true;
        }
        let widths = vec![0; options.columns.len()];
        Self { options, widths }
    }

    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    /// True if rows are padded to aligned columns
    pub fn pads_columns(&self) -> bool {
        !self.options.plain0 && !self.options.json && !self.options.summary_only
    }

    /// Widen the columns to fit this entry. Call for every entry before
    /// formatting any row.
    pub fn measure(&mut self, entry: &FileEntry) {
        if !self.pads_columns() || self.options.columns.is_empty() {
            return;
        }
        let last = self.options.columns.len() - 1;
        for i in 0..last {
            let field = self.format_field(entry, self.options.columns[i], None, false);
            let width = field.chars().count();
            if width > self.widths[i] {
                self.widths[i] = width;
            }
        }
    }

    /// Format one field: escaped, and padded if `width` is given
    pub fn format_field(&self, entry: &FileEntry, col: Column, width: Option<usize>, last: bool) -> String {
        let text = self.field_text(entry, col);
        let field = escape_field(text.as_deref(), last);
        match width {
            None => field,
            Some(w) if col.is_numeric() => format!("{:>w$}", field, w = w),
            Some(w) => format!("{:<w$}", field, w = w),
        }
    }

    fn field_text(&self, entry: &FileEntry, col: Column) -> Option<String> {
        if col.is_numeric() {
            return entry
                .get_numeric(col)
                .map(|n| format_number(n, self.options.group_numerics));
        }
        let text = entry.get_string(col)?;
        match (col, &self.options.zone) {
            (Column::Mtime, Some(zone)) => Some(zone.adjust(&text)),
            _ => Some(text.into_owned()),
        }
    }

    /// Format one entry row
    pub fn format_row(&self, entry: &FileEntry) -> String {
        let count = self.options.columns.len();
        let fields: Vec<String> = self
            .options
            .columns
            .iter()
            .enumerate()
            .map(|(i, &col)| {
                let last = i + 1 == count;
                if self.options.plain0 {
                    self.format_field(entry, col, None, true)
                } else if last || !self.pads_columns() {
                    self.format_field(entry, col, None, last)
                } else {
                    self.format_field(entry, col, Some(self.widths[i]), false)
                }
            })
            .collect();
        if self.options.plain0 {
            fields.join("\0")
        } else {
            format!("  {}", fields.join("  "))
        }
    }

    /// Format one entry as indented JSON lines; `more` adds the separating
    /// comma for all but the final entry
    pub fn format_json(&self, entry: &FileEntry, more: bool) -> Result<Vec<String>> {
        let mut object = serde_json::Map::new();
        for &col in &self.options.columns {
            let value = if col.is_numeric() {
                entry
                    .get_numeric(col)
                    .map_or(serde_json::Value::Null, serde_json::Value::from)
            } else {
                self.field_text(entry, col)
                    .map_or(serde_json::Value::Null, serde_json::Value::from)
            };
            object.insert(col.long_name().to_string(), value);
        }

        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        object.serialize(&mut serializer)?;
        let text = String::from_utf8_lossy(&buf);

        let mut lines: Vec<String> = text.lines().map(|l| format!("    {}", l)).collect();
        if more {
            if let Some(last) = lines.last_mut() {
                last.push(',');
            }
        }
        Ok(lines)
    }

    /// Lines written before any entry
    pub fn header_lines(&self, info: &HeaderInfo) -> Vec<String> {
        if self.options.plain {
            return Vec::new();
        }
        if self.options.json {
            return vec!["[".to_string()];
        }

        let mut command_line = info.command_line.clone();
        if command_line.len() > MAX_COMMAND_LINE {
            let mut cut = MAX_COMMAND_LINE;
            while !command_line.is_char_boundary(cut) {
                cut -= 1;
            }
            command_line.truncate(cut);
            command_line.push_str(" ...");
        }

        let mut lines = vec![
            MAGIC_HEADER.to_string(),
            directive(format!("Command line: {}", command_line)),
            directive(format!("Current working directory: {}", info.working_dir)),
            directive(format!("Compare keys: {}", format_column_names(info.compare_keys.iter().copied()))),
        ];
        if !info.sort_keys.is_empty() {
            lines.push(directive(format!(
                "Sort keys: {}",
                format_column_names(info.sort_keys.iter().copied())
            )));
        }
        lines.push(directive(format!(
            "Evaluated columns: {}",
            format_column_names(info.evaluated.iter().copied())
        )));
        lines.push(directive(format!("Run start time: {}", self.render_time(info.start_time))));
        lines.push(directive(String::new()));
        lines.push(directive(format!(
            "Columns: {}",
            format_column_names(self.options.columns.iter().copied())
        )));
        lines.push(directive(String::new()));
        lines
    }

    /// Lines written after the last entry
    pub fn footer_lines(&self, info: &FooterInfo) -> Vec<String> {
        if self.options.plain {
            return Vec::new();
        }
        if self.options.json {
            return vec!["]".to_string()];
        }
        let mut lines = vec![
            directive(String::new()),
            directive(format!("Run end time: {}", self.render_time(info.end_time))),
            directive(format!("Elapsed time: {}", format_elapsed(info.elapsed))),
            directive(String::new()),
        ];
        lines.extend(info.stats.iter().map(|l| directive(l.clone())));
        lines.extend(info.diagnostics.iter().map(|l| directive(l.clone())));
        lines
    }

    fn render_time(&self, t: DateTime<Utc>) -> String {
        match &self.options.zone {
            Some(zone) => zone.format(t),
            None => mstamp_to_mtime(t.timestamp()).unwrap_or_else(|| t.to_rfc3339()),
        }
    }
}

fn directive(text: String) -> String {
    format!("| {}", text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use test_case::test_case;

    fn entry() -> FileEntry {
        let mut e = FileEntry::new();
        e.set_string(Column::Path, "dir/my file");
        e.set_numeric(Column::Size, 1234567);
        e.set_string(Column::Mtime, "2017-07-14T02:40:00Z");
        e
    }

    fn writer(columns: &[Column]) -> EntryWriter {
        EntryWriter::new(WriterOptions {
            columns: columns.to_vec(),
            ..Default::default()
        })
    }

    #[test_case(0, false, "0")]
    #[test_case(999, true, "999")]
    #[test_case(1000, true, "1,000")]
    #[test_case(1234567, true, "1,234,567")]
    #[test_case(-1234567, true, "-1,234,567")]
    #[test_case(-1234567, false, "-1234567")]
    #[test_case(i64::MIN, true, "-9,223,372,036,854,775,808")]
    fn test_format_number(n: i64, group: bool, want: &str) {
        assert_eq!(format_number(n, group), want);
    }

    #[test_case(Duration::from_nanos(0), "0s")]
    #[test_case(Duration::from_nanos(512), "512ns")]
    #[test_case(Duration::from_micros(1500), "1.5ms")]
    #[test_case(Duration::from_millis(2500), "2.5s")]
    #[test_case(Duration::from_secs(3723), "1h2m3s")]
    #[test_case(Duration::from_secs(61), "1m1s")]
    fn test_format_elapsed(d: Duration, want: &str) {
        assert_eq!(format_elapsed(d), want);
    }

    #[test]
    fn test_output_zone() {
        assert_eq!("UTC".parse::<OutputZone>().unwrap(), OutputZone::Utc);
        assert_eq!("Local".parse::<OutputZone>().unwrap(), OutputZone::Local);
        let zone: OutputZone = "+02:00".parse().unwrap();
        assert_eq!(zone.adjust("2017-07-14T02:40:00Z"), "2017-07-14T04:40:00+02:00");
        let zone: OutputZone = "-05:30".parse().unwrap();
        assert_eq!(zone.adjust("2017-07-14T02:40:00Z"), "2017-07-13T21:10:00-05:30");
        assert_eq!(zone.adjust("not a time"), "not a time");
        assert!("Mars/Olympus".parse::<OutputZone>().is_err());
        assert!("+2".parse::<OutputZone>().is_err());
    }

    #[test]
    fn test_padded_rows() {
        let mut w = writer(&[Column::Size, Column::User, Column::Path]);
        let mut small = FileEntry::new();
        small.set_string(Column::Path, "a");
        small.set_numeric(Column::Size, 5);
        small.set_string(Column::User, "root");
        w.measure(&entry());
        w.measure(&small);

        assert_eq!(w.format_row(&entry()), "  1234567  \\~    dir/my file");
        assert_eq!(w.format_row(&small), "        5  root  a");
    }

    #[test]
    fn test_grouped_and_zoned_rows() {
        let mut w = EntryWriter::new(WriterOptions {
            columns: vec![Column::Size, Column::Mtime, Column::Path],
            group_numerics: true,
            zone: Some(OutputZone::Fixed(FixedOffset::east_opt(3600).unwrap())),
            ..Default::default()
        });
        w.measure(&entry());
        assert_eq!(
            w.format_row(&entry()),
            "  1,234,567  2017-07-14T03:40:00+01:00  dir/my file"
        );
    }

    #[test]
    fn test_spaces_escaped_except_last() {
        let mut w = writer(&[Column::Path, Column::Base]);
        w.measure(&entry());
        assert_eq!(w.format_row(&entry()), "  dir/my\\ file  my file");
    }

    #[test]
    fn test_plain0_rows() {
        let mut w = EntryWriter::new(WriterOptions {
            columns: vec![Column::Path, Column::Size, Column::User],
            plain0: true,
            ..Default::default()
        });
        w.measure(&entry());
        assert!(w.options().plain);
        assert!(!w.pads_columns());
        assert_eq!(w.format_row(&entry()), "dir/my file\u{0}1234567\u{0}\\~");
    }

    #[test]
    fn test_json_rows() {
        let w = EntryWriter::new(WriterOptions {
            columns: vec![Column::Size, Column::User, Column::Path],
            json: true,
            ..Default::default()
        });
        let lines = w.format_json(&entry(), true).unwrap();
        assert_eq!(
            lines,
            vec![
                "    {",
                "        \"path\": \"dir/my file\",",
                "        \"size\": 1234567,",
                "        \"user\": null",
                "    },",
            ]
        );
        let lines = w.format_json(&entry(), false).unwrap();
        assert_eq!(lines.last().map(String::as_str), Some("    }"));
    }

    #[test]
    fn test_header_and_footer() {
        let w = writer(&[Column::Size, Column::Path]);
        let start = Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap();
        let info = HeaderInfo {
            command_line: "-c sp /tmp".to_string(),
            working_dir: "/home/me".to_string(),
            compare_keys: vec![Column::Path.into()],
            sort_keys: vec![ColumnRef::inverted(Column::Size)],
            evaluated: vec![Column::Path, Column::Size],
            start_time: start,
        };
        assert_eq!(
            w.header_lines(&info),
            vec![
                MAGIC_HEADER,
                "| Command line: -c sp /tmp",
                "| Current working directory: /home/me",
                "| Compare keys: path",
                "| Sort keys: /size",
                "| Evaluated columns: path,size",
                "| Run start time: 2020-01-02T03:04:05Z",
                "| ",
                "| Columns: size,path",
                "| ",
            ]
        );

        let footer = w.footer_lines(&FooterInfo {
            end_time: start,
            elapsed: Duration::from_secs(2),
            stats: vec!["STATISTICS:  Count".to_string()],
            diagnostics: vec![],
        });
        assert_eq!(
            footer,
            vec![
                "| ",
                "| Run end time: 2020-01-02T03:04:05Z",
                "| Elapsed time: 2s",
                "| ",
                "| STATISTICS:  Count",
            ]
        );
    }

    #[test]
    fn test_long_command_line_is_cut() {
        let w = writer(&[Column::Path]);
        let info = HeaderInfo {
            command_line: "x".repeat(600),
            working_dir: String::new(),
            compare_keys: vec![],
            sort_keys: vec![],
            evaluated: vec![],
            start_time: Utc::now(),
        };
        let lines = w.header_lines(&info);
        assert_eq!(lines[1], format!("| Command line: {} ...", "x".repeat(500)));
    }

    #[test]
    fn test_plain_and_json_framing() {
        let plain = EntryWriter::new(WriterOptions { plain: true, ..Default::default() });
        let json = EntryWriter::new(WriterOptions { json: true, ..Default::default() });
        let footer = FooterInfo {
            end_time: Utc::now(),
            elapsed: Duration::ZERO,
            stats: vec![],
            diagnostics: vec![],
        };
        assert!(plain.footer_lines(&footer).is_empty());
        assert_eq!(json.footer_lines(&footer), vec!["]"]);
    }
}
