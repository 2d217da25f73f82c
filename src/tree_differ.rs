//! Tree Differ (spec §4.5): classify discrepancies between two listings.
//!
//! Grounded directly on `sml_sync/file_trees.py::compare_file_trees`: index
//! both sides by path, emit all `LeftOnly` (in left input order), then all
//! `RightOnly` (in right input order), then for shared paths emit
//! `TypeDifferent` or `AttrsDifferent` (in left input order). Directory
//! attribute differences are never reported.

use std::collections::HashMap;

use crate::model::{Difference, FsObject, FsObjectType};

pub fn compare(left: &[FsObject], right: &[FsObject]) -> Vec<Difference> {
    let left_by_path: HashMap<&str, &FsObject> =
        left.iter().map(|o| (o.path.as_str(), o)).collect();
    let right_by_path: HashMap<&str, &FsObject> =
        right.iter().map(|o| (o.path.as_str(), o)).collect();

    let mut differences = Vec::new();

    for obj in left {
        if !right_by_path.contains_key(obj.path.as_str()) {
            differences.push(Difference::left_only(obj.clone()));
        }
    }

    for obj in right {
        if !left_by_path.contains_key(obj.path.as_str()) {
            differences.push(Difference::right_only(obj.clone()));
        }
    }

    for left_obj in left {
        if let Some(right_obj) = right_by_path.get(left_obj.path.as_str()) {
            let right_obj = (*right_obj).clone();
            if left_obj.obj_type != right_obj.obj_type {
                differences.push(Difference::type_different(left_obj.clone(), right_obj));
            } else if left_obj.obj_type == FsObjectType::File && left_obj.attrs != right_obj.attrs {
                differences.push(Difference::attrs_different(left_obj.clone(), right_obj));
            }
            // Directory mtime differences are intentionally suppressed.
        }
    }

    differences
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DifferenceType, DirectoryAttrs, FileAttrs};
    use chrono::{TimeZone, Utc};

    fn ts(secs: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn file(path: &str, mtime: i64, size: u64) -> FsObject {
        FsObject::file(path, FileAttrs::new(ts(mtime), size))
    }

    fn dir(path: &str, mtime: i64) -> FsObject {
        FsObject::directory(path, DirectoryAttrs::new(ts(mtime)))
    }

    #[test]
    fn every_path_appears_at_most_once() {
        let left = vec![file("a.txt", 1, 10), file("b.txt", 1, 10)];
        let right = vec![file("b.txt", 1, 10), file("c.txt", 1, 10)];
        let diffs = compare(&left, &right);
        let mut seen = std::collections::HashSet::new();
        for d in &diffs {
            assert!(seen.insert(d.path().to_string()), "path {} seen twice", d.path());
        }
        // a.txt -> LeftOnly, c.txt -> RightOnly, b.txt identical -> nothing
        assert_eq!(diffs.len(), 2);
    }

    #[test]
    fn no_path_present_in_neither_side_appears() {
        let left = vec![file("a.txt", 1, 10)];
        let right = vec![file("a.txt", 1, 10)];
        let diffs = compare(&left, &right);
        for d in &diffs {
            assert_ne!(d.path(), "nonexistent.txt");
        }
    }

    #[test]
    fn comparing_a_listing_with_itself_yields_nothing() {
        let listing = vec![file("a.txt", 1, 10), dir("sub", 2), file("sub/b.txt", 3, 5)];
        assert!(compare(&listing, &listing).is_empty());
    }

    #[test]
    fn compare_is_a_mirror_image_when_swapped() {
        let left = vec![file("a.txt", 1, 10), file("shared.txt", 1, 10), dir("d", 1)];
        let right = vec![file("b.txt", 2, 20), file("shared.txt", 2, 10), dir("d", 2)];

        let forward = compare(&left, &right);
        let backward = compare(&right, &left);

        let swap_type = |t: DifferenceType| match t {
            DifferenceType::LeftOnly => DifferenceType::RightOnly,
            DifferenceType::RightOnly => DifferenceType::LeftOnly,
            other => other,
        };

        assert_eq!(forward.len(), backward.len());
        for f in &forward {
            let expected_type = swap_type(f.difference_type);
            let found = backward.iter().any(|b| {
                b.path() == f.path()
                    && b.difference_type == expected_type
                    && b.left == f.right
                    && b.right == f.left
            });
            assert!(found, "no mirror for {:?} at {}", f.difference_type, f.path());
        }
    }

    #[test]
    fn directory_only_mtime_differences_never_appear() {
        let left = vec![dir("sub", 1)];
        let right = vec![dir("sub", 100)];
        assert!(compare(&left, &right).is_empty());
    }

    #[test]
    fn attrs_different_only_for_files() {
        let left = vec![file("a.txt", 1, 10)];
        let right = vec![file("a.txt", 2, 10)];
        let diffs = compare(&left, &right);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].difference_type, DifferenceType::AttrsDifferent);
    }

    #[test]
    fn type_different_when_kinds_disagree() {
        let left = vec![file("x", 1, 10)];
        let right = vec![dir("x", 1)];
        let diffs = compare(&left, &right);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].difference_type, DifferenceType::TypeDifferent);
    }
}
