//! Directory scanning using walkdir
//!
//! The scanner turns a directory tree into [`FileEntry`] records and hands
//! them to a [`ScanSink`]. Directories are offered to the sink twice: once
//! before descending, as a prune check, and once after all of their contents,
//! with their cumulative size, as a real entry.

use std::collections::HashMap;
use std::fs::{self, Metadata};
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use crate::column::Column;
use crate::entry::{modestr_to_filetype, FileEntry};
use crate::error::{Result, SiftError};
use crate::filter::glob_to_regex;

/// Options for directory scanning
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Follow symbolic links
    pub follow_links: bool,
    /// Only produce entries for regular files
    pub regular_only: bool,
    /// Don't descend into directories on other devices
    pub xdev: bool,
    /// Glob patterns matched against base names; matches are skipped
    pub excludes: Vec<String>,
}

/// A file found by the scanner
#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub entry: FileEntry,
    /// Location on disk, for reading content
    pub path: PathBuf,
    /// True for regular files
    pub regular: bool,
}

/// Receives what a scan finds
pub trait ScanSink {
    /// Called with a directory's entry before descending into it. Return
    /// false to skip the directory and everything under it.
    fn descend(&mut self, dir: &FileEntry) -> bool;

    /// Offer a file to the run. Return true if it was kept; only kept files
    /// count toward the cumulative size of their directory.
    fn accept(&mut self, file: ScannedFile) -> bool;

    fn warning(&mut self, message: String);

    fn error(&mut self, message: String);
}

/// A directory whose entry is emitted once its contents are done
struct PendingDir {
    entry: FileEntry,
    path: PathBuf,
    depth: usize,
    device: u64,
    size: i64,
}

/// Cache of user and group names by id
#[derive(Debug, Default)]
struct NameCache {
    users: HashMap<u32, std::result::Result<String, String>>,
    groups: HashMap<u32, std::result::Result<String, String>>,
}

impl NameCache {
    fn user(&mut self, uid: u32) -> std::result::Result<String, String> {
        self.users.entry(uid).or_insert_with(|| lookup_user(uid)).clone()
    }

    fn group(&mut self, gid: u32) -> std::result::Result<String, String> {
        self.groups.entry(gid).or_insert_with(|| lookup_group(gid)).clone()
    }
}

/// Directory scanner
pub struct DirectoryScanner {
    options: ScanOptions,
    columns: Vec<Column>,
    excludes: Vec<Regex>,
    names: NameCache,
}

impl DirectoryScanner {
    /// Create a scanner that fills in `columns` (path and size are always
    /// filled in). Fails if an exclude pattern is not a valid glob.
    pub fn new(options: ScanOptions, columns: &[Column]) -> Result<Self> {
        let excludes = options
            .excludes
            .iter()
            .map(|g| glob_to_regex(g))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            options,
            columns: columns.to_vec(),
            excludes,
            names: NameCache::default(),
        })
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Get metadata, following links if configured to
    pub fn stat(&self, path: &Path) -> std::io::Result<Metadata> {
        if self.options.follow_links {
            fs::metadata(path)
        } else {
            fs::symlink_metadata(path)
        }
    }

    /// Scan a single file given as a root. Its entry gets the path `.`.
    pub fn scan_file(&mut self, path: &Path, sink: &mut dyn ScanSink) -> Result<()> {
        let meta = self
            .stat(path)
            .map_err(|e| SiftError::path_error(path, format!("Can't get file information: {}", e)))?;
        let entry = self.build_entry(".", &meta, sink);
        sink.accept(ScannedFile {
            entry,
            path: path.to_path_buf(),
            regular: meta.is_file(),
        });
        Ok(())
    }

    /// Scan the tree under `root`, which must be a directory. Returns the
    /// cumulative size of the kept files.
    pub fn scan(&mut self, root: &Path, sink: &mut dyn ScanSink) -> Result<i64> {
        let root_meta = self
            .stat(root)
            .map_err(|e| SiftError::path_error(root, format!("Can't get file information: {}", e)))?;
        if !root_meta.is_dir() {
            return Err(SiftError::path_error(root, "Path is not a directory"));
        }

        let mut walker = WalkDir::new(root)
            .follow_links(self.options.follow_links)
            .sort_by_file_name()
            .into_iter();
        let mut pending: Vec<PendingDir> = Vec::new();
        let mut total = 0i64;

        while let Some(next) = walker.next() {
            let dent = match next {
                Ok(dent) => dent,
                Err(err) => {
                    if err.loop_ancestor().is_some() {
                        let at = err.path().map(|p| p.display().to_string()).unwrap_or_default();
                        sink.warning(format!("Found circular symlink reference at: {}", at));
                    } else {
                        sink.error(format!("Can't get info about file: {}", err));
                    }
                    continue;
                }
            };

            let depth = dent.depth();
            self.close_dirs(&mut pending, depth, sink, &mut total);

            if depth == 0 {
                let entry = self.build_entry(".", &root_meta, sink);
                pending.push(PendingDir {
                    entry,
                    path: root.to_path_buf(),
                    depth,
                    device: device_of(&root_meta),
                    size: 0,
                });
                continue;
            }

            let is_dir = dent.file_type().is_dir();
            let name = dent.file_name().to_string_lossy();
            if self.excludes.iter().any(|re| re.is_match(&name)) {
                if is_dir {
                    walker.skip_current_dir();
                }
                continue;
            }

            let meta = match dent.metadata() {
                Ok(meta) => meta,
                Err(e) => {
                    sink.error(format!("Can't get info about file: {}", e));
                    if is_dir {
                        walker.skip_current_dir();
                    }
                    continue;
                }
            };
            let rel = relative_path(root, dent.path());

            if meta.is_dir() {
                let parent_device = pending.last().map_or(0, |d| d.device);
                if !self.options.xdev || device_of(&meta) == parent_device {
                    let entry = self.build_entry(&rel, &meta, sink);
                    if sink.descend(&entry) {
                        pending.push(PendingDir {
                            entry,
                            path: dent.path().to_path_buf(),
                            depth,
                            device: device_of(&meta),
                            size: 0,
                        });
                    } else {
                        debug!(path = %rel, "Pruned directory");
                        walker.skip_current_dir();
                    }
                    continue;
                }
                // on another device: an entry of its own, never descended
                walker.skip_current_dir();
            }

            if self.options.regular_only && !meta.is_file() {
                continue;
            }
            let entry = self.build_entry(&rel, &meta, sink);
            let size = entry.numeric_or_zero(Column::Size);
            let kept = sink.accept(ScannedFile {
                entry,
                path: dent.path().to_path_buf(),
                regular: meta.is_file(),
            });
            if kept {
                if let Some(parent) = pending.last_mut() {
                    parent.size += size;
                }
            }
        }
        self.close_dirs(&mut pending, 0, sink, &mut total);

        debug!(root = %root.display(), size = total, "Scan complete");
        Ok(total)
    }

    /// Emit the entries of pending directories at `depth` or deeper
    fn close_dirs(&self, pending: &mut Vec<PendingDir>, depth: usize, sink: &mut dyn ScanSink, total: &mut i64) {
        while pending.last().map_or(false, |d| d.depth >= depth) {
            let Some(mut dir) = pending.pop() else {
                break;
            };
            match pending.last_mut() {
                Some(parent) => parent.size += dir.size,
                None => *total += dir.size,
            }
            if !self.options.regular_only {
                dir.entry.set_numeric(Column::Size, dir.size);
                sink.accept(ScannedFile {
                    entry: dir.entry,
                    path: dir.path,
                    regular: false,
                });
            }
        }
    }

    /// Build an entry for a file with the given root-relative path
    fn build_entry(&mut self, rel: &str, meta: &Metadata, sink: &mut dyn ScanSink) -> FileEntry {
        let mut entry = FileEntry::new();
        if meta.is_dir() {
            entry.set_string(Column::Path, format!("{}/", rel));
        } else {
            entry.set_string(Column::Path, rel);
        }
        entry.set_numeric(Column::Size, if meta.is_file() { meta.len() as i64 } else { 0 });

        let info = extended_info(meta);
        let names = &mut self.names;
        for &col in &self.columns {
            match col {
                Column::Mtime => {
                    if let Some(t) = modified(meta) {
                        entry.set_string(col, t.to_rfc3339_opts(SecondsFormat::Secs, true));
                    }
                }
                Column::Mstamp => {
                    if let Some(t) = modified(meta) {
                        entry.set_numeric(col, t.timestamp());
                    }
                }
                Column::Modestr => entry.set_string(col, mode_string(meta)),
                Column::FileType => entry.set_string(col, modestr_to_filetype(&mode_string(meta))),
                Column::Device => entry.set_numeric(col, info.device as i64),
                Column::Nlinks => entry.set_numeric(col, info.nlinks as i64),
                Column::Uid if info.ids_valid => entry.set_numeric(col, i64::from(info.uid)),
                Column::Gid if info.ids_valid => entry.set_numeric(col, i64::from(info.gid)),
                Column::User if info.ids_valid => match names.user(info.uid) {
                    Ok(name) => entry.set_string(col, name),
                    Err(e) => sink.error(format!("Could not get user name for UID {}: {}", info.uid, e)),
                },
                Column::Group if info.ids_valid => match names.group(info.gid) {
                    Ok(name) => entry.set_string(col, name),
                    Err(e) => sink.error(format!("Could not get group name for GID {}: {}", info.gid, e)),
                },
                _ => {}
            }
        }
        entry
    }
}

/// Root-relative path with `/` separators
fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

fn modified(meta: &Metadata) -> Option<DateTime<Utc>> {
    meta.modified().ok().map(DateTime::<Utc>::from)
}

/// Ownership and device details not in the portable metadata
#[derive(Debug, Default)]
struct ExtendedInfo {
    device: u64,
    nlinks: u64,
    uid: u32,
    gid: u32,
    ids_valid: bool,
}

#[cfg(unix)]
fn extended_info(meta: &Metadata) -> ExtendedInfo {
    use std::os::unix::fs::MetadataExt;
    ExtendedInfo {
        device: meta.dev(),
        nlinks: meta.nlink(),
        uid: meta.uid(),
        gid: meta.gid(),
        ids_valid: true,
    }
}

#[cfg(not(unix))]
fn extended_info(_meta: &Metadata) -> ExtendedInfo {
    ExtendedInfo {
        nlinks: 1,
        ..Default::default()
    }
}

fn device_of(meta: &Metadata) -> u64 {
    extended_info(meta).device
}

#[cfg(unix)]
fn lookup_user(uid: u32) -> std::result::Result<String, String> {
    use nix::unistd::{Uid, User};
    match User::from_uid(Uid::from_raw(uid)) {
        Ok(Some(user)) => Ok(user.name),
        Ok(None) => Err("unknown user id".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(unix)]
fn lookup_group(gid: u32) -> std::result::Result<String, String> {
    use nix::unistd::{Gid, Group};
    match Group::from_gid(Gid::from_raw(gid)) {
        Ok(Some(group)) => Ok(group.name),
        Ok(None) => Err("unknown group id".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(not(unix))]
fn lookup_user(_uid: u32) -> std::result::Result<String, String> {
    Err("user names are not supported on this platform".to_string())
}

#[cfg(not(unix))]
fn lookup_group(_gid: u32) -> std::result::Result<String, String> {
    Err("group names are not supported on this platform".to_string())
}

/// Mode string: type letters (or `-`) followed by `rwx` permission triples,
/// e.g. `drwxr-xr-x`, `Lrwxrwxrwx`, `Dcrw-rw----`
#[cfg(unix)]
pub fn mode_string(meta: &Metadata) -> String {
    use std::os::unix::fs::{FileTypeExt, MetadataExt};

    let ft = meta.file_type();
    let mode = meta.mode();
    let mut out = String::with_capacity(12);
    let flags = [
        ('d', ft.is_dir()),
        ('L', ft.is_symlink()),
        ('D', ft.is_block_device() || ft.is_char_device()),
        ('p', ft.is_fifo()),
        ('S', ft.is_socket()),
        ('u', mode & 0o4000 != 0),
        ('g', mode & 0o2000 != 0),
        ('c', ft.is_char_device()),
        ('t', mode & 0o1000 != 0),
    ];
    for (letter, set) in flags {
        if set {
            out.push(letter);
        }
    }
    if out.is_empty() {
        out.push('-');
    }
    push_permissions(&mut out, mode);
    out
}

#[cfg(not(unix))]
pub fn mode_string(meta: &Metadata) -> String {
    let mut out = String::from(if meta.is_dir() { "d" } else { "-" });
    let mode = if meta.permissions().readonly() { 0o444 } else { 0o666 };
    push_permissions(&mut out, mode);
    out
}

fn push_permissions(out: &mut String, mode: u32) {
    const RWX: [char; 3] = ['r', 'w', 'x'];
    for bit in (0..9).rev() {
        if mode & (1 << bit) != 0 {
            out.push(RWX[2 - bit % 3]);
        } else {
            out.push('-');
        }
    }
}
