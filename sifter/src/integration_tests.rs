//! End-to-end runs of the sifter over temporary trees

use std::fs;
use std::io::Cursor;
use std::path::Path;

use filetime::{set_file_mtime, FileTime};
use tempfile::TempDir;

use crate::column::Column;
use crate::engine::{RunOutcome, Sifter};
use crate::error::SiftError;
use crate::matcher::VERIFY_FAILED;
use crate::options::SiftOptions;
use crate::output::SharedBuffer;
use crate::scanner::ScanOptions;
use crate::snapshot::MAGIC_HEADER;

struct Run {
    outcome: RunOutcome,
    out: String,
    err: String,
}

fn run(options: SiftOptions) -> Run {
    run_sifter(Sifter::new(&options).unwrap())
}

fn run_sifter(sifter: Sifter) -> Run {
    let out = SharedBuffer::default();
    let err = SharedBuffer::default();
    let outcome = sifter.run_with(out.clone(), err.clone()).unwrap();
    Run {
        outcome,
        out: out.contents(),
        err: err.contents(),
    }
}

fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
    set_file_mtime(path, FileTime::from_unix_time(1_700_000_000, 0)).unwrap();
}

/// a.txt (3 bytes), sub/b.txt (5 bytes)
fn small_tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_file(&dir.path().join("a.txt"), "abc");
    write_file(&dir.path().join("sub/b.txt"), "hello");
    dir
}

fn root(dir: &TempDir) -> String {
    dir.path().display().to_string()
}

fn paths(outcome: &RunOutcome) -> Vec<String> {
    outcome
        .entries
        .iter()
        .map(|e| e.get_string(Column::Path).unwrap().into_owned())
        .collect()
}

/// Entry rows of a padded text run: everything between the header and
/// footer directives
fn rows(out: &str) -> Vec<&str> {
    out.lines().filter(|l| !l.starts_with('|')).collect()
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test_log::test]
fn test_single_side_snapshot() {
    let tree = small_tree();
    let result = run(SiftOptions {
        columns: strings(&["sp"]),
        left: vec![root(&tree)],
        ..Default::default()
    });

    assert_eq!(result.outcome.exit_code, 0);
    let lines: Vec<&str> = result.out.lines().collect();
    assert_eq!(lines[0], MAGIC_HEADER);
    assert!(lines.contains(&"| Columns: size,path"));
    assert!(lines.contains(&"| Compare keys: path,size,mtime,modestr"));
    assert_eq!(
        rows(&result.out),
        vec!["  3  a.txt", "  5  sub/b.txt", "  5  sub/", "  8  ./"]
    );
    assert!(result.out.contains("| STATISTICS:"));

    let stats = &result.outcome.stats;
    assert_eq!(stats.scanned.left.count, 4);
    assert_eq!(stats.scanned.left.size, 8);
    assert_eq!(stats.output.left.count, 4);
    assert_eq!(stats.scanned.right.count, 0);
}

#[tokio::test]
async fn test_run_from_async_context() {
    let tree = small_tree();
    let result = run(SiftOptions {
        columns: strings(&["p"]),
        plain: true,
        left: vec![root(&tree)],
        ..Default::default()
    });

    assert_eq!(result.outcome.exit_code, 0);
    assert_eq!(result.out, "  a.txt\n  sub/b.txt\n  sub/\n  ./\n");
}

#[test]
fn test_snapshot_read_back_as_root() {
    let tree = small_tree();
    let first = run(SiftOptions {
        left: vec![root(&tree)],
        ..Default::default()
    });

    let work = TempDir::new().unwrap();
    let snapshot = work.path().join("tree.sift");
    fs::write(&snapshot, &first.out).unwrap();

    let second = run(SiftOptions {
        left: vec![snapshot.display().to_string()],
        ..Default::default()
    });
    assert_eq!(second.outcome.exit_code, 0);
    assert_eq!(paths(&second.outcome), paths(&first.outcome));
    assert_eq!(rows(&second.out), rows(&first.out));

    // Without detection the snapshot file is just a file
    let plain = run(SiftOptions {
        left: vec![snapshot.display().to_string()],
        no_detect: true,
        ..Default::default()
    });
    assert_eq!(paths(&plain.outcome), vec!["."]);
}

fn two_sided_trees() -> (TempDir, TempDir) {
    let left = TempDir::new().unwrap();
    write_file(&left.path().join("only_left.txt"), "l");
    write_file(&left.path().join("same.txt"), "x");
    let right = TempDir::new().unwrap();
    write_file(&right.path().join("only_right.txt"), "r");
    write_file(&right.path().join("same.txt"), "x");
    (left, right)
}

fn two_sided(left: &TempDir, right: &TempDir) -> SiftOptions {
    SiftOptions {
        columns: strings(&["p"]),
        key: strings(&["p"]),
        regular_only: true,
        plain: true,
        left: vec![root(left)],
        right: vec![root(right)],
        ..Default::default()
    }
}

#[test_log::test]
fn test_two_sided_membership() {
    let (left, right) = two_sided_trees();
    let result = run(two_sided(&left, &right));

    assert_eq!(result.outcome.exit_code, 0);
    assert_eq!(
        result.out.lines().collect::<Vec<_>>(),
        vec![
            "  <!  only_left.txt",
            "  <=  same.txt",
            "  >!  only_right.txt",
            "  >=  same.txt",
        ]
    );

    let stats = &result.outcome.stats;
    assert_eq!(stats.unmatched.left.count, 1);
    assert_eq!(stats.unmatched.right.count, 1);
    assert_eq!(stats.matching.left.count, 1);
    assert_eq!(stats.matching.right.count, 1);
}

#[test]
fn test_membership_filter() {
    let (left, right) = two_sided_trees();
    let mut options = two_sided(&left, &right);
    options.membership = Some("LR".to_string());
    let result = run(options);

    assert_eq!(paths(&result.outcome), vec!["only_left.txt", "only_right.txt"]);
    assert_eq!(result.outcome.stats.output.total_count(), 2);
}

#[test]
fn test_verify_failure_sets_exit_code() {
    let (left, right) = two_sided_trees();
    let mut options = two_sided(&left, &right);
    options.verify = true;
    let result = run(options);

    assert_eq!(result.outcome.exit_code, 1);
    assert_eq!(result.outcome.error_count, 1);
    assert!(result.err.contains(&format!("Error: {}", VERIFY_FAILED)));

    // Every left entry matched: no failure
    fs::remove_file(left.path().join("only_left.txt")).unwrap();
    let mut options = two_sided(&left, &right);
    options.verify = true;
    assert_eq!(run(options).outcome.exit_code, 0);
}

#[test]
fn test_redundancy_columns() {
    let left = TempDir::new().unwrap();
    write_file(&left.path().join("one/dup.txt"), "same");
    write_file(&left.path().join("two/dup.txt"), "same");
    let result = run(SiftOptions {
        columns: strings(&["rIp"]),
        key: strings(&["b,s"]),
        sort: strings(&["p"]),
        regular_only: true,
        plain: true,
        left: vec![root(&left)],
        ..Default::default()
    });

    assert_eq!(
        result.out.lines().collect::<Vec<_>>(),
        vec!["  2  1  one/dup.txt", "  2  2  two/dup.txt"]
    );
}

#[test]
fn test_sort_descending_with_postfilter() {
    let tree = small_tree();
    write_file(&tree.path().join("big.bin"), "0123456789");
    let result = run(SiftOptions {
        columns: strings(&["sp"]),
        sort: strings(&["/s"]),
        postfilter: strings(&["size>=5"]),
        regular_only: true,
        plain: true,
        left: vec![root(&tree)],
        ..Default::default()
    });

    assert_eq!(paths(&result.outcome), vec!["big.bin", "sub/b.txt"]);
    assert_eq!(result.out, "  10  big.bin\n   5  sub/b.txt\n");
}

#[test]
fn test_prune_prefilter_skips_directory() {
    let tree = small_tree();
    write_file(&tree.path().join("keep/c.txt"), "c");
    let result = run(SiftOptions {
        columns: strings(&["p"]),
        prefilter: strings(&["/base!=sub"]),
        left: vec![root(&tree)],
        ..Default::default()
    });

    assert_eq!(paths(&result.outcome), vec!["a.txt", "keep/c.txt", "keep/", "./"]);
    // A pruned directory is never scanned at all
    assert_eq!(result.outcome.stats.scanned.left.count, 4);
}

#[test]
fn test_plain_prefilter_keeps_scanning() {
    let tree = small_tree();
    let result = run(SiftOptions {
        columns: strings(&["p"]),
        prefilter: strings(&["base!=sub"]),
        left: vec![root(&tree)],
        ..Default::default()
    });

    assert_eq!(paths(&result.outcome), vec!["a.txt", "sub/b.txt", "./"]);
    assert_eq!(result.outcome.stats.scanned.left.count, 4);
    assert_eq!(result.outcome.stats.indexed.left.count, 3);
}

#[test]
fn test_md5_shortcut() {
    let tree = small_tree();
    let result = run(SiftOptions {
        columns: strings(&["p"]),
        md5: true,
        left: vec![root(&tree)],
        ..Default::default()
    });

    let a = &result.outcome.entries[0];
    assert_eq!(a.get_string(Column::Path).unwrap(), "a.txt");
    assert_eq!(
        a.get_string(Column::Md5).unwrap(),
        "900150983cd24fb0d6963f7d28e17f72"
    );
    let dir = result.outcome.entries.last().unwrap();
    assert!(dir.is_dir());
    assert_eq!(dir.get_string(Column::Md5).unwrap(), "");
    assert!(result.out.contains("| Columns: md5,path"));
}

#[test]
fn test_json_output() {
    let tree = small_tree();
    let result = run(SiftOptions {
        columns: strings(&["sp"]),
        json: true,
        regular_only: true,
        left: vec![root(&tree)],
        ..Default::default()
    });

    let value: serde_json::Value = serde_json::from_str(&result.out).unwrap();
    let rows = value.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["path"], "a.txt");
    assert_eq!(rows[0]["size"], 3);
    assert_eq!(rows[1]["path"], "sub/b.txt");
}

#[test]
fn test_plain0_output() {
    let tree = small_tree();
    write_file(&tree.path().join("with space.txt"), "ws");
    let result = run(SiftOptions {
        columns: strings(&["sp"]),
        plain0: true,
        regular_only: true,
        left: vec![root(&tree)],
        ..Default::default()
    });

    assert_eq!(result.out, "3\0a.txt\05\0sub/b.txt\02\0with space.txt\0");
}

#[test]
fn test_summary_only() {
    let tree = small_tree();
    let result = run(SiftOptions {
        summary_only: true,
        group_numerics: true,
        left: vec![root(&tree)],
        ..Default::default()
    });

    assert!(rows(&result.out).is_empty());
    assert!(result.out.contains("| STATISTICS:"));
    assert_eq!(result.outcome.stats.output.left.count, 4);
}

const STDIN_SNAPSHOT: &str = "| Columns: size,path\n  1  b\n  2  a\n";

#[test]
fn test_stdin_snapshot_root() {
    let options = SiftOptions {
        columns: strings(&["sp"]),
        sort: strings(&["p"]),
        plain: true,
        left: vec!["-".to_string()],
        ..Default::default()
    };
    let sifter = Sifter::new(&options).unwrap().with_stdin(Cursor::new(STDIN_SNAPSHOT));
    let result = run_sifter(sifter);

    assert_eq!(result.outcome.exit_code, 0);
    assert_eq!(result.out, "  2  a\n  1  b\n");
}

#[test]
fn test_null_compare_is_an_error() {
    let options = SiftOptions {
        columns: strings(&["p"]),
        sort: strings(&["u"]),
        plain: true,
        left: vec!["-".to_string()],
        ..Default::default()
    };
    let sifter = Sifter::new(&options).unwrap().with_stdin(Cursor::new(STDIN_SNAPSHOT));
    let result = run_sifter(sifter);

    assert!(result.outcome.null_compares > 0);
    assert_eq!(result.outcome.exit_code, 1);
    assert!(result.err.contains("Comparison of a NULL value attempted"));

    let ignoring = SiftOptions {
        ignore_nulls: true,
        ..options
    };
    let sifter = Sifter::new(&ignoring).unwrap().with_stdin(Cursor::new(STDIN_SNAPSHOT));
    assert_eq!(run_sifter(sifter).outcome.exit_code, 0);
}

#[test]
fn test_bad_snapshot_row_is_reported() {
    let options = SiftOptions {
        columns: strings(&["sp"]),
        plain: true,
        left: vec!["-".to_string()],
        ..Default::default()
    };
    let input = "| Columns: size,path\n  x  a\n  2  b\n";
    let sifter = Sifter::new(&options).unwrap().with_stdin(Cursor::new(input));
    let result = run_sifter(sifter);

    // The row stays, without the column that failed to parse
    assert_eq!(paths(&result.outcome), vec!["a", "b"]);
    assert_eq!(result.outcome.exit_code, 1);
    assert!(result.err.contains("Parse error in snapshot line 2"));
}

#[test]
fn test_fatal_errors() {
    let missing = SiftOptions {
        left: strings(&["/definitely/not/here"]),
        ..Default::default()
    };
    let err = Sifter::new(&missing)
        .unwrap()
        .run_with(SharedBuffer::default(), SharedBuffer::default())
        .unwrap_err();
    assert!(matches!(err, SiftError::Path { .. }));

    let headless = SiftOptions {
        left: strings(&["-"]),
        ..Default::default()
    };
    let err = Sifter::new(&headless)
        .unwrap()
        .with_stdin(Cursor::new("  1  a\n"))
        .run_with(SharedBuffer::default(), SharedBuffer::default())
        .unwrap_err();
    assert!(matches!(err, SiftError::Snapshot { line: 1, .. }));

    let bad_column = SiftOptions {
        columns: strings(&["nope"]),
        ..Default::default()
    };
    assert!(Sifter::new(&bad_column).is_err());
}

#[test]
fn test_output_file() {
    let tree = small_tree();
    let work = TempDir::new().unwrap();
    let target = work.path().join("out.txt");
    let options = SiftOptions {
        columns: strings(&["p"]),
        plain: true,
        regular_only: true,
        left: vec![root(&tree)],
        output: Some(target.clone()),
        ..Default::default()
    };
    let outcome = Sifter::new(&options).unwrap().run().unwrap();

    assert_eq!(outcome.entries.len(), 2);
    assert_eq!(fs::read_to_string(&target).unwrap(), "  a.txt\n  sub/b.txt\n");
}

#[test]
fn test_scan_directory_helper() {
    let tree = small_tree();
    let entries = crate::scan_directory(tree.path(), ScanOptions::default(), &[Column::Mtime]).unwrap();

    let got: Vec<String> = entries
        .iter()
        .map(|e| e.get_string(Column::Path).unwrap().into_owned())
        .collect();
    assert_eq!(got, vec!["a.txt", "sub/b.txt", "sub/", "./"]);
    assert!(entries[0].has(Column::Mtime));
}

#[test]
fn test_read_snapshot_helper() {
    let entries = crate::read_snapshot(Cursor::new(STDIN_SNAPSHOT)).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].get_numeric(Column::Size), Some(2));
}
