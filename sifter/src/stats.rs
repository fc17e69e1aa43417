//! Per-phase file statistics and the summary table

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::writer::format_number;

/// File count and total size for one side
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideStats {
    pub count: i64,
    pub size: i64,
}

/// Counts for both sides of one phase of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseStats {
    pub left: SideStats,
    pub right: SideStats,
}

impl PhaseStats {
    /// Count one file of `size` bytes on a side (false = left)
    pub fn update(&mut self, side: bool, size: i64) {
        let s = if side { &mut self.right } else { &mut self.left };
        s.count += 1;
        s.size += size;
    }

    pub fn total_count(&self) -> i64 {
        self.left.count + self.right.count
    }

    pub fn total_size(&self) -> i64 {
        self.left.size + self.right.size
    }
}

/// The phases a file passes through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Seen by the walker or read from a snapshot
    Scanned,
    /// Passed the pre-filter
    Indexed,
    /// Left without a counterpart on the other side
    Unmatched,
    /// Matched by the other side
    Matching,
    /// Written to the output
    Output,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Scanned => "Scanned:",
            Phase::Indexed => "Indexed:",
            Phase::Unmatched => "Unmatched:",
            Phase::Matching => "Matching:",
            Phase::Output => "Output:",
        }
    }
}

/// Statistics for a whole run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub scanned: PhaseStats,
    pub indexed: PhaseStats,
    pub unmatched: PhaseStats,
    pub matching: PhaseStats,
    pub output: PhaseStats,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self, phase: Phase) -> &PhaseStats {
        match phase {
            Phase::Scanned => &self.scanned,
            Phase::Indexed => &self.indexed,
            Phase::Unmatched => &self.unmatched,
            Phase::Matching => &self.matching,
            Phase::Output => &self.output,
        }
    }

    pub fn record(&mut self, phase: Phase, side: bool, size: i64) {
        let stats = match phase {
            Phase::Scanned => &mut self.scanned,
            Phase::Indexed => &mut self.indexed,
            Phase::Unmatched => &mut self.unmatched,
            Phase::Matching => &mut self.matching,
            Phase::Output => &mut self.output,
        };
        stats.update(side, size);
    }

    /// The statistics table as text lines, every column right-aligned to its
    /// widest cell. Unmatched and matching rows only appear when both sides
    /// have roots.
    pub fn summary_table(&self, has_left: bool, has_right: bool, group_numerics: bool) -> Vec<String> {
        let phases: &[Phase] = if has_left && has_right {
            &[Phase::Scanned, Phase::Indexed, Phase::Unmatched, Phase::Matching, Phase::Output]
        } else {
            &[Phase::Scanned, Phase::Indexed, Phase::Output]
        };

        let mut header = vec!["STATISTICS:".to_string()];
        if has_left {
            if has_right {
                header.extend(["L:Count".to_string(), "L:Size".to_string()]);
            } else {
                header.extend(["Count".to_string(), "Size".to_string()]);
            }
        }
        if has_right {
            header.extend(["R:Count".to_string(), "R:Size".to_string()]);
        }

        let mut rows = vec![header];
        for &phase in phases {
            let stats = self.phase(phase);
            let mut row = vec![phase.label().to_string()];
            if has_left {
                row.push(format_number(stats.left.count, group_numerics));
                row.push(format_number(stats.left.size, group_numerics));
            }
            if has_right {
                row.push(format_number(stats.right.count, group_numerics));
                row.push(format_number(stats.right.size, group_numerics));
            }
            rows.push(row);
        }

        let mut widths = vec![0usize; rows[0].len()];
        for row in &rows {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.chars().count());
            }
        }
        rows.iter()
            .map(|row| {
                row.iter()
                    .zip(&widths)
                    .map(|(cell, &w)| format!("{:>w$}", cell, w = w))
                    .collect::<Vec<_>>()
                    .join("  ")
            })
            .collect()
    }

    /// Log the final counts
    pub fn log_summary(&self) {
        info!(
            scanned = self.scanned.total_count(),
            scanned_bytes = self.scanned.total_size(),
            indexed = self.indexed.total_count(),
            unmatched = self.unmatched.total_count(),
            matching = self.matching.total_count(),
            output = self.output.total_count(),
            "Run statistics"
        );
    }
}
