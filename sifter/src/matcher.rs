//! Match and redundancy analysis across the two sides of a run.
//!
//! Entries are grouped by the compare key: a group is a maximal run of
//! entries, in key order, that compare equal to the run's first member. A
//! group whose members come from both sides is matched. Within a group, an
//! entry's redundancy is the number of members on its own side.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::column::{Column, ColumnRef};
use crate::comparator::EntryComparator;
use crate::entry::FileEntry;
use crate::report::Report;
use crate::stats::{Phase, RunStats};

/// Error text for a failed `--verify` run
pub const VERIFY_FAILED: &str = "At least one entry on the left was unmatched (--verify was specified)";

/// Which annotations the analysis writes besides `matched` and `redundancy`
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MatchOptions {
    /// Write 1-based same-side ordinals to the `redunidx` column
    pub redundancy_index: bool,
    /// Treat any unmatched left entry as a failure
    pub verify: bool,
}

/// What an analysis pass found
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchSummary {
    /// Number of key groups
    pub groups: usize,
    /// Groups with members on both sides
    pub matched_groups: usize,
    /// Left entries without a counterpart
    pub unmatched_left: usize,
    /// Right entries without a counterpart
    pub unmatched_right: usize,
    /// Set when verification was requested and some left entry is unmatched
    pub verify_failed: bool,
}

/// Groups entries by compare key and annotates each with its match status
pub struct MatchAnalyzer {
    comparator: EntryComparator,
    options: MatchOptions,
}

impl MatchAnalyzer {
    pub fn new(keys: Vec<ColumnRef>, options: MatchOptions) -> Self {
        Self {
            comparator: EntryComparator::new(keys),
            options,
        }
    }

    /// Annotate `entries` in place. The slice keeps its order; grouping
    /// works on a key-sorted permutation. Matched and unmatched statistics
    /// go to `stats`; comparisons against missing values go to `report`.
    pub fn analyze(
        &self,
        entries: &mut [FileEntry],
        stats: &mut RunStats,
        report: &mut Report,
    ) -> MatchSummary {
        self.comparator.resolve_keys(entries);

        let mut order: Vec<usize> = (0..entries.len()).collect();
        let mut nulls = 0u64;
        order.sort_by(|&a, &b| {
            let (ord, not_null) = self.comparator.compare(&entries[a], &entries[b]);
            if !not_null {
                nulls += 1;
            }
            ord
        });
        report.add_null_compares(nulls);

        let mut summary = MatchSummary::default();
        let mut base = 0;
        for cur in 1..=order.len() {
            if cur < order.len() {
                let (ord, not_null) = self
                    .comparator
                    .compare(&entries[order[base]], &entries[order[cur]]);
                report.check_null_compare(not_null);
                if ord == Ordering::Equal {
                    continue;
                }
            }
            self.annotate_group(entries, &order[base..cur], stats, &mut summary);
            base = cur;
        }

        summary.verify_failed = self.options.verify && summary.unmatched_left > 0;
        debug!(
            entries = entries.len(),
            groups = summary.groups,
            matched_groups = summary.matched_groups,
            unmatched_left = summary.unmatched_left,
            unmatched_right = summary.unmatched_right,
            "Match analysis complete"
        );
        summary
    }

    fn annotate_group(
        &self,
        entries: &mut [FileEntry],
        group: &[usize],
        stats: &mut RunStats,
        summary: &mut MatchSummary,
    ) {
        let (mut left, mut right) = (0i64, 0i64);
        for &i in group {
            let counter = if entries[i].side() { &mut right } else { &mut left };
            *counter += 1;
            if self.options.redundancy_index {
                entries[i].set_numeric(Column::RedunIdx, *counter);
            }
        }

        let matched = left > 0 && right > 0;
        summary.groups += 1;
        if matched {
            summary.matched_groups += 1;
        }

        for &i in group {
            let entry = &mut entries[i];
            let side = entry.side();
            entry.set_bool(Column::Matched, matched);
            entry.set_numeric(Column::Redundancy, if side { right } else { left });

            let phase = if matched { Phase::Matching } else { Phase::Unmatched };
            stats.record(phase, side, entry.stats_size());
            if !matched {
                if side {
                    summary.unmatched_right += 1;
                } else {
                    summary.unmatched_left += 1;
                }
            }
        }
    }
}
