//! Unit tests for match and redundancy analysis

use crate::column::{Column, ColumnRef};
use crate::entry::FileEntry;
use crate::matcher::*;
use crate::report::Report;
use crate::stats::{RunStats, SideStats};
use proptest::prelude::*;
use rstest::*;

/// Create an entry on a side with a path and size
fn create_entry(path: &str, size: i64, side: bool) -> FileEntry {
    let mut e = FileEntry::new();
    e.set_string(Column::Path, path);
    e.set_numeric(Column::Size, size);
    e.set_bool(Column::Side, side);
    e
}

fn path_key() -> Vec<ColumnRef> {
    vec![Column::Path.into()]
}

fn num(e: &FileEntry, col: Column) -> Option<i64> {
    e.get_numeric(col)
}

#[fixture]
fn analyzer() -> MatchAnalyzer {
    MatchAnalyzer::new(
        path_key(),
        MatchOptions {
            redundancy_index: true,
            verify: true,
        },
    )
}

mod grouping_tests {
    use super::*;

    #[rstest]
    fn test_same_path_on_both_sides_matches(analyzer: MatchAnalyzer) {
        let mut entries = vec![create_entry("a", 1, false), create_entry("a", 1, true)];
        let mut stats = RunStats::new();
        let mut report = Report::new(false);
        let summary = analyzer.analyze(&mut entries, &mut stats, &mut report);

        for e in &entries {
            assert_eq!(num(e, Column::Matched), Some(1));
            assert_eq!(num(e, Column::Redundancy), Some(1));
            assert_eq!(num(e, Column::RedunIdx), Some(1));
        }
        assert_eq!(entries[0].get_string(Column::Membership).as_deref(), Some("<="));
        assert_eq!(entries[1].get_string(Column::Membership).as_deref(), Some(">="));
        assert_eq!(summary.groups, 1);
        assert_eq!(summary.matched_groups, 1);
        assert!(!summary.verify_failed);
        assert_eq!(stats.matching.left, SideStats { count: 1, size: 1 });
        assert_eq!(stats.matching.right, SideStats { count: 1, size: 1 });
        assert_eq!(report.null_compares(), 0);
    }

    #[rstest]
    fn test_redundant_left_group(analyzer: MatchAnalyzer) {
        let mut entries = vec![
            create_entry("x", 1, false),
            create_entry("x", 2, false),
            create_entry("y", 4, true),
            create_entry("x", 3, false),
        ];
        let mut stats = RunStats::new();
        let mut report = Report::new(false);
        let summary = analyzer.analyze(&mut entries, &mut stats, &mut report);

        // scan order is kept
        let sizes: Vec<_> = entries.iter().map(|e| num(e, Column::Size).unwrap()).collect();
        assert_eq!(sizes, [1, 2, 4, 3]);

        for (i, e) in [&entries[0], &entries[1], &entries[3]].iter().enumerate() {
            assert_eq!(num(e, Column::Matched), Some(0));
            assert_eq!(num(e, Column::Redundancy), Some(3));
            assert_eq!(num(e, Column::RedunIdx), Some(i as i64 + 1));
        }
        assert_eq!(num(&entries[2], Column::Matched), Some(0));
        assert_eq!(num(&entries[2], Column::Redundancy), Some(1));
        assert_eq!(num(&entries[2], Column::RedunIdx), Some(1));

        assert_eq!(summary.unmatched_left, 3);
        assert_eq!(summary.unmatched_right, 1);
        assert!(summary.verify_failed);
        assert_eq!(stats.unmatched.left, SideStats { count: 3, size: 6 });
        assert_eq!(stats.unmatched.right, SideStats { count: 1, size: 4 });
    }

    #[test]
    fn test_verify_off_never_fails() {
        let analyzer = MatchAnalyzer::new(path_key(), MatchOptions::default());
        let mut entries = vec![create_entry("only-left", 1, false)];
        let summary = analyzer.analyze(&mut entries, &mut RunStats::new(), &mut Report::new(false));
        assert_eq!(summary.unmatched_left, 1);
        assert!(!summary.verify_failed);
        assert!(!entries[0].has(Column::RedunIdx));
    }

    #[rstest]
    fn test_directories_count_zero_bytes(analyzer: MatchAnalyzer) {
        let mut entries = vec![create_entry("d/", 4096, false), create_entry("d/", 100, true)];
        let mut stats = RunStats::new();
        analyzer.analyze(&mut entries, &mut stats, &mut Report::new(false));
        assert_eq!(stats.matching.left, SideStats { count: 1, size: 0 });
        assert_eq!(stats.matching.right, SideStats { count: 1, size: 0 });
    }

    #[test]
    fn test_multi_column_key() {
        let keys = vec![Column::Path.into(), Column::Size.into()];
        let analyzer = MatchAnalyzer::new(keys, MatchOptions::default());
        let mut entries = vec![
            create_entry("a", 1, false),
            create_entry("a", 2, true),
            create_entry("b", 5, false),
            create_entry("b", 5, true),
        ];
        let summary = analyzer.analyze(&mut entries, &mut RunStats::new(), &mut Report::new(false));
        assert_eq!(summary.groups, 3);
        assert_eq!(num(&entries[0], Column::Matched), Some(0));
        assert_eq!(num(&entries[1], Column::Matched), Some(0));
        assert_eq!(num(&entries[2], Column::Matched), Some(1));
        assert_eq!(num(&entries[3], Column::Matched), Some(1));
    }

    #[test]
    fn test_missing_side_counts_as_left() {
        let analyzer = MatchAnalyzer::new(path_key(), MatchOptions::default());
        let mut e = FileEntry::new();
        e.set_string(Column::Path, "a");
        let mut entries = vec![e];
        analyzer.analyze(&mut entries, &mut RunStats::new(), &mut Report::new(false));
        assert_eq!(num(&entries[0], Column::Matched), Some(0));
        assert_eq!(num(&entries[0], Column::Redundancy), Some(1));
    }

    #[test]
    fn test_empty_input() {
        let analyzer = MatchAnalyzer::new(path_key(), MatchOptions::default());
        let summary = analyzer.analyze(&mut [], &mut RunStats::new(), &mut Report::new(false));
        assert_eq!(summary, MatchSummary::default());
    }
}

mod null_tests {
    use super::*;

    #[test]
    fn test_missing_keys_are_tallied() {
        let keys = vec![Column::User.into()];
        let analyzer = MatchAnalyzer::new(keys, MatchOptions::default());
        let mut entries = vec![create_entry("a", 1, false), create_entry("b", 1, true)];
        let mut report = Report::new(false);
        let summary = analyzer.analyze(&mut entries, &mut RunStats::new(), &mut report);

        // all-null keys compare equal, so the two entries form one group
        assert_eq!(summary.groups, 1);
        assert!(report.null_compares() >= 1);
        assert_eq!(report.error_count(), 0);
    }

    #[test]
    fn test_ignored_nulls_are_not_tallied() {
        let keys = vec![Column::User.into()];
        let analyzer = MatchAnalyzer::new(keys, MatchOptions::default());
        let mut entries = vec![create_entry("a", 1, false), create_entry("b", 1, true)];
        let mut report = Report::new(true);
        analyzer.analyze(&mut entries, &mut RunStats::new(), &mut report);
        assert_eq!(report.null_compares(), 0);
    }
}

proptest! {
    #[test]
    fn test_group_invariants(
        items in prop::collection::vec(("[a-c]", any::<bool>()), 0..24)
    ) {
        let analyzer = MatchAnalyzer::new(
            path_key(),
            MatchOptions { redundancy_index: true, verify: false },
        );
        let mut entries: Vec<FileEntry> = items
            .iter()
            .map(|(p, side)| create_entry(p, 1, *side))
            .collect();
        analyzer.analyze(&mut entries, &mut RunStats::new(), &mut Report::new(false));

        for e in &entries {
            let path = e.get_string(Column::Path).unwrap().into_owned();
            let same_side = items.iter().filter(|(p, s)| *p == path && *s == e.side()).count() as i64;
            let other_side = items.iter().filter(|(p, s)| *p == path && *s != e.side()).count() as i64;
            prop_assert_eq!(num(e, Column::Redundancy), Some(same_side));
            prop_assert_eq!(num(e, Column::Matched), Some(i64::from(other_side > 0)));
            let idx = num(e, Column::RedunIdx).unwrap();
            prop_assert!(idx >= 1 && idx <= same_side);
        }
    }
}
