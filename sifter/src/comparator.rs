//! Multi-key entry comparison with null semantics, used for sorting and for
//! grouping entries under a compare key.

use std::cmp::Ordering;

use crate::column::{Column, ColumnRef};
use crate::entry::FileEntry;

/// Compares entries column by column.
///
/// The second element of every comparison result is false when a missing
/// value took part in the decision; callers count those as null comparisons.
#[derive(Debug, Clone, Default)]
pub struct EntryComparator {
    keys: Vec<ColumnRef>,
}

impl EntryComparator {
    pub fn new(keys: Vec<ColumnRef>) -> Self {
        Self { keys }
    }

    pub fn keys(&self) -> &[ColumnRef] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn compare(&self, a: &FileEntry, b: &FileEntry) -> (Ordering, bool) {
        compare(a, b, &self.keys)
    }

    /// Stable sort by the key columns. Ties keep their original order.
    /// Returns how many comparisons involved a missing value.
    pub fn sort(&self, entries: &mut [FileEntry]) -> u64 {
        let mut nulls = 0u64;
        entries.sort_by(|a, b| {
            let (ord, not_null) = self.compare(a, b);
            if !not_null {
                nulls += 1;
            }
            ord
        });
        nulls
    }

    /// Write derived key values into each entry so comparisons during the
    /// sort read stored values.
    pub fn resolve_keys(&self, entries: &mut [FileEntry]) {
        for entry in entries.iter_mut() {
            for key in &self.keys {
                entry.resolve(key.column);
            }
        }
    }
}

/// Compare two entries on `keys`, in order.
///
/// The first key where both values are present and differ decides. If only
/// one side is missing a value, the missing one sorts first and the result
/// is returned immediately with the null flag cleared. Keys missing on both
/// sides are skipped but still clear the flag on an overall tie.
pub fn compare(a: &FileEntry, b: &FileEntry, keys: &[ColumnRef]) -> (Ordering, bool) {
    let mut not_null = true;
    for key in keys {
        let (ord, present) = compare_column(a, b, key.column);
        let ord = if key.inverse { ord.reverse() } else { ord };
        match present {
            Presence::Both if ord != Ordering::Equal => return (ord, true),
            Presence::Both => {}
            Presence::One => return (ord, false),
            Presence::Neither => not_null = false,
        }
    }
    (Ordering::Equal, not_null)
}

enum Presence {
    Both,
    One,
    Neither,
}

fn compare_column(a: &FileEntry, b: &FileEntry, col: Column) -> (Ordering, Presence) {
    fn order<T: Ord>(x: Option<T>, y: Option<T>) -> (Ordering, Presence) {
        match (x, y) {
            (Some(x), Some(y)) => (x.cmp(&y), Presence::Both),
            (None, Some(_)) => (Ordering::Less, Presence::One),
            (Some(_), None) => (Ordering::Greater, Presence::One),
            (None, None) => (Ordering::Equal, Presence::Neither),
        }
    }

    if col.is_numeric() {
        order(a.get_numeric(col), b.get_numeric(col))
    } else {
        // str ordering is byte-wise
        order(a.get_string(col), b.get_string(col))
    }
}
