//! Property tests for entry derivations and comparison using proptest

use std::cmp::Ordering;

use proptest::prelude::*;

use crate::column::{Column, ColumnRef};
use crate::comparator::compare;
use crate::entry::*;

/// Strategy for generating path elements
pub fn path_element() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_\\-]{1,12}(\\.[a-z]{1,4})?"
}

/// Strategy for generating root-relative entry paths, directories ending in '/'
pub fn entry_path() -> impl Strategy<Value = String> {
    (prop::collection::vec(path_element(), 1..5), any::<bool>()).prop_map(|(parts, is_dir)| {
        let mut path = parts.join("/");
        if is_dir {
            path.push('/');
        }
        path
    })
}

/// Strategy for entries with a path and a size, and sometimes a user
pub fn entry() -> impl Strategy<Value = FileEntry> {
    (entry_path(), 0i64..1_000_000, prop::option::of("[a-z]{1,6}")).prop_map(|(path, size, user)| {
        let mut e = FileEntry::new();
        e.set_string(Column::Path, path);
        e.set_numeric(Column::Size, size);
        if let Some(user) = user {
            e.set_string(Column::User, user);
        }
        e
    })
}

fn full_key() -> Vec<ColumnRef> {
    vec![Column::Path.into(), Column::Size.into()]
}

proptest! {
    #[test]
    fn test_depth_counts_separators(path in entry_path()) {
        let mut e = FileEntry::new();
        e.set_string(Column::Path, path.as_str());
        prop_assert_eq!(e.get_numeric(Column::Depth), Some(path.matches('/').count() as i64));
    }

    #[test]
    fn test_base_has_no_separator(path in entry_path()) {
        let base = path_base(&path);
        prop_assert!(!base.contains('/'));
        prop_assert!(path.trim_end_matches('/').ends_with(&base));
    }

    #[test]
    fn test_ext_is_suffix_of_base(path in entry_path()) {
        let base = path_base(&path);
        let ext = path_ext(&base);
        prop_assert!(base.ends_with(ext));
        prop_assert!(ext.is_empty() || ext.starts_with('.'));
    }

    #[test]
    fn test_clean_path_is_idempotent(path in "[a-z./]{0,20}") {
        let once = clean_path(&path);
        prop_assert_eq!(clean_path(&once), once.clone());
        prop_assert!(!once.contains("//"));
    }

    #[test]
    fn test_resolve_agrees_with_derivation(path in entry_path()) {
        let mut e = FileEntry::new();
        e.set_string(Column::Path, path.as_str());
        let derived = e.get_string(Column::Base).map(|b| b.into_owned());
        prop_assert!(e.resolve(Column::Base));
        prop_assert_eq!(e.get_string(Column::Base).map(|b| b.into_owned()), derived);
    }

    #[test]
    fn test_compare_reflexive(e in entry()) {
        prop_assert_eq!(compare(&e, &e, &full_key()), (Ordering::Equal, true));
    }

    #[test]
    fn test_compare_antisymmetric(a in entry(), b in entry()) {
        let (ab, ab_ok) = compare(&a, &b, &full_key());
        let (ba, ba_ok) = compare(&b, &a, &full_key());
        prop_assert_eq!(ab, ba.reverse());
        prop_assert!(ab_ok && ba_ok);
    }

    #[test]
    fn test_null_keys_are_flagged(a in entry(), b in entry()) {
        let key = vec![ColumnRef::new(Column::User)];
        let (_, not_null) = compare(&a, &b, &key);
        let both_present = a.has(Column::User) && b.has(Column::User);
        prop_assert_eq!(not_null, both_present);
    }

    #[test]
    fn test_mstamp_round_trip(stamp in 0i64..4_000_000_000) {
        let mtime = mstamp_to_mtime(stamp).unwrap();
        prop_assert_eq!(mtime_to_mstamp(&mtime), Some(stamp));
    }
}
