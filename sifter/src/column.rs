//! Column registry: the fixed catalog of file attributes a sifter run can
//! scan, derive, filter on, compare, and output.

use std::fmt;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SiftError};

/// An attribute kind. The discriminant is the column's stable identity and
/// its index into a [`FileEntry`](crate::entry::FileEntry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Column {
    Path,
    Base,
    Ext,
    Dir,
    Depth,
    Size,
    Mtime,
    Mstamp,
    Device,
    Side,
    Matched,
    Membership,
    Redundancy,
    RedunIdx,
    Modestr,
    FileType,
    Uid,
    Gid,
    User,
    Group,
    Nlinks,
    Crc32,
    Sha1,
    Sha256,
    Sha512,
    Md5,
    Blake3,
}

/// Static definition of one column
#[derive(Debug, Clone, Copy)]
pub struct ColumnDef {
    pub column: Column,
    pub short: char,
    pub long: &'static str,
    pub help: &'static str,
}

/// Column definitions, indexed by column identity
pub const COLUMN_DEFS: [ColumnDef; Column::COUNT] = [
    def(Column::Path, 'p', "path", "The path of this file relative to the given root"),
    def(Column::Base, 'b', "base", "The base name of this file"),
    def(Column::Ext, 'x', "ext", "The extension of this filename, if any"),
    def(Column::Dir, 'D', "dir", "The directory part of the 'path' field"),
    def(Column::Depth, 'd', "depth", "How many subdirectories this file is below its root"),
    def(Column::Size, 's', "size", "Regular files: size in bytes. Dirs: cumulative size; Other: 0"),
    def(Column::Mtime, 't', "mtime", "Modification time as a string"),
    def(Column::Mstamp, 'T', "mstamp", "Modification time as seconds since the Unix epoch"),
    def(Column::Device, 'V', "device", "The ID of the device this file resides on"),
    def(Column::Side, 'S', "side", "The 'side' of this file's root: '0'=left '1'=right"),
    def(Column::Matched, 'M', "matched", "True if this file matches any file from the *other* side"),
    def(Column::Membership, 'm', "membership", "Visual representation of 'side' and 'matched' columns"),
    def(Column::Redundancy, 'r', "redundancy", "Count of files matching this file on *this* side"),
    def(Column::RedunIdx, 'I', "redunidx", "Ordinal of this file amongst equivalents on *this* side"),
    def(Column::Modestr, 'o', "modestr", "Mode and permission bits as a human readable string"),
    def(Column::FileType, 'f', "filetype", "The type of this file: f=regular, d=dir, etc."),
    def(Column::Uid, 'U', "uid", "The user ID of this file's owner"),
    def(Column::Gid, 'G', "gid", "The group ID of this file's group"),
    def(Column::User, 'u', "user", "The name of this file's owner"),
    def(Column::Group, 'g', "group", "The name of this file's group"),
    def(Column::Nlinks, 'L', "nlinks", "The number of hard links to this file"),
    def(Column::Crc32, '3', "crc32", "The CRC32 digest of this file"),
    def(Column::Sha1, '1', "sha1", "The SHA1 digest of this file"),
    def(Column::Sha256, '2', "sha256", "The SHA256 digest of this file"),
    def(Column::Sha512, 'A', "sha512", "The SHA512 digest of this file"),
    def(Column::Md5, '5', "md5", "The MD5 digest of this file"),
    def(Column::Blake3, 'B', "blake3", "The BLAKE3 digest of this file"),
];

/// Order in which columns are listed in help text
const HELP_ORDER: [Column; Column::COUNT] = [
    Column::Path,
    Column::Base,
    Column::Ext,
    Column::Dir,
    Column::Depth,
    Column::Size,
    Column::Mtime,
    Column::Mstamp,
    Column::Modestr,
    Column::FileType,
    Column::Uid,
    Column::Gid,
    Column::User,
    Column::Group,
    Column::Nlinks,
    Column::Device,
    Column::Side,
    Column::Matched,
    Column::Membership,
    Column::Redundancy,
    Column::RedunIdx,
    Column::Crc32,
    Column::Sha1,
    Column::Sha256,
    Column::Sha512,
    Column::Md5,
    Column::Blake3,
];

const fn def(column: Column, short: char, long: &'static str, help: &'static str) -> ColumnDef {
    ColumnDef { column, short, long, help }
}

impl Column {
    /// Number of columns in the registry
    pub const COUNT: usize = 27;

    /// All columns in identity order
    pub const ALL: [Column; Column::COUNT] = [
        Column::Path,
        Column::Base,
        Column::Ext,
        Column::Dir,
        Column::Depth,
        Column::Size,
        Column::Mtime,
        Column::Mstamp,
        Column::Device,
        Column::Side,
        Column::Matched,
        Column::Membership,
        Column::Redundancy,
        Column::RedunIdx,
        Column::Modestr,
        Column::FileType,
        Column::Uid,
        Column::Gid,
        Column::User,
        Column::Group,
        Column::Nlinks,
        Column::Crc32,
        Column::Sha1,
        Column::Sha256,
        Column::Sha512,
        Column::Md5,
        Column::Blake3,
    ];

    /// Digest columns, in the order digests are computed
    pub const DIGESTS: [Column; 6] = [
        Column::Md5,
        Column::Sha1,
        Column::Sha256,
        Column::Sha512,
        Column::Crc32,
        Column::Blake3,
    ];

    /// Index of this column into per-column tables
    pub fn index(self) -> usize {
        self as usize
    }

    /// The static definition of this column
    pub fn def(self) -> &'static ColumnDef {
        &COLUMN_DEFS[self.index()]
    }

    /// Single-character name
    pub fn short_name(self) -> char {
        self.def().short
    }

    /// Full name
    pub fn long_name(self) -> &'static str {
        self.def().long
    }

    /// True if this column holds an i64 value rather than a string
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            Column::Depth
                | Column::Size
                | Column::Mstamp
                | Column::Device
                | Column::Redundancy
                | Column::RedunIdx
                | Column::Uid
                | Column::Gid
                | Column::Nlinks
                | Column::Side
                | Column::Matched
        )
    }

    /// True if this column is always computed at analysis time and is never
    /// scanned, parsed, or written to a snapshot
    pub fn is_dynamic(self) -> bool {
        matches!(
            self,
            Column::Side
                | Column::Matched
                | Column::Redundancy
                | Column::RedunIdx
                | Column::Membership
        )
    }

    /// True if this column holds a content digest
    pub fn is_digest(self) -> bool {
        Self::DIGESTS.contains(&self)
    }

    /// Look up a column by short or long name
    pub fn lookup(name: &str) -> Option<Column> {
        let mut chars = name.chars();
        let single = match (chars.next(), chars.next()) {
            (Some(c), None) => Some(c),
            _ => None,
        };
        COLUMN_DEFS
            .iter()
            .find(|d| d.long == name || Some(d.short) == single)
            .map(|d| d.column)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.long_name())
    }
}

/// A column chosen in a column list, with the optional inverse marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRef {
    pub column: Column,
    /// Set by a leading `/`; sort keys use it to sort descending
    pub inverse: bool,
}

impl ColumnRef {
    pub fn new(column: Column) -> Self {
        Self { column, inverse: false }
    }

    pub fn inverted(column: Column) -> Self {
        Self { column, inverse: true }
    }
}

impl From<Column> for ColumnRef {
    fn from(column: Column) -> Self {
        Self::new(column)
    }
}

/// Help lines describing every column: short name, long name, help text
pub fn column_help() -> Vec<String> {
    HELP_ORDER
        .iter()
        .map(|c| {
            let d = c.def();
            format!("{} {:<12} {}", d.short, d.long, d.help)
        })
        .collect()
}

/// Parse a comma-separated list of short and/or long column names.
///
/// A list without commas that is not itself a column name is read one
/// character at a time, so `"stp"` is the same as `"size,mtime,path"`. A `/`
/// before a name (or before a character in the compact form) sets the
/// inverse marker, which is rejected unless `allow_inverse` is set.
pub fn parse_column_list(list: &str, allow_inverse: bool) -> Result<Vec<ColumnRef>> {
    let mut columns = Vec::new();
    if list.is_empty() {
        return Ok(columns);
    }

    let compact = !list.contains(',') && Column::lookup(list.trim_start_matches('/')).is_none();
    if compact {
        let mut inverse = false;
        for c in list.chars() {
            if c == '/' {
                inverse = true;
                continue;
            }
            let column = Column::lookup(c.encode_utf8(&mut [0; 4]))
                .ok_or_else(|| SiftError::UnknownColumn(c.to_string()))?;
            columns.push(ColumnRef { column, inverse });
            inverse = false;
        }
        if inverse {
            return Err(SiftError::UnknownColumn("/".to_string()));
        }
    } else {
        for token in list.split(',') {
            let (inverse, name) = match token.strip_prefix('/') {
                Some(rest) => (true, rest),
                None => (false, token),
            };
            let column =
                Column::lookup(name).ok_or_else(|| SiftError::UnknownColumn(token.to_string()))?;
            columns.push(ColumnRef { column, inverse });
        }
    }

    if !allow_inverse && columns.iter().any(|c| c.inverse) {
        return Err(SiftError::InverseNotAllowed(list.to_string()));
    }
    Ok(columns)
}

/// Comma-separated long names of the given columns
pub fn format_column_names<I>(columns: I) -> String
where
    I: IntoIterator,
    I::Item: Into<ColumnRef>,
{
    columns
        .into_iter()
        .map(|c| {
            let c = c.into();
            if c.inverse {
                format!("/{}", c.column)
            } else {
                c.column.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}
