//! Last-write-wins merging of an ordered bundle sequence.
//!
//! Bundles are applied in sequence order; an entry whose path was already
//! present replaces the earlier content. Since a node's own bundle comes last
//! in its closure, a dependent always shadows what it inherited.
//!
//! The merged bundle lists entries sorted by path, so the order in which
//! unrelated bundles contributed disjoint paths is not visible in its bytes.
//! Merging fails only when one bundle's file sits where another bundle needs
//! a directory.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use super::bundle::{Bundle, BundleEntry, BundleError};

/// Merge bundles in order. The result is sorted by entry path.
pub fn merge_bundles<'a>(bundles: impl IntoIterator<Item = &'a Bundle>) -> Result<Bundle, BundleError> {
  let mut merged: BTreeMap<&'a str, &'a [u8]> = BTreeMap::new();

  for (position, bundle) in bundles.into_iter().enumerate() {
    for entry in bundle.entries() {
      if merged.insert(entry.path.as_str(), entry.contents.as_slice()).is_some() {
        debug!(path = %entry.path, position, "entry overridden");
      }
    }
  }

  let entries = merged
    .into_iter()
    .map(|(path, contents)| BundleEntry {
      path: path.to_string(),
      contents: contents.to_vec(),
    })
    .collect();

  Bundle::from_entries(entries)
}

/// Read bundle files and merge them in the given order.
///
/// Every input is read and validated before anything is merged, so an
/// unreadable or malformed input yields an error and never a partial result.
pub fn merge_files<P: AsRef<Path>>(paths: &[P]) -> Result<Bundle, BundleError> {
  let bundles = paths
    .iter()
    .map(|p| Bundle::read_from(p.as_ref()))
    .collect::<Result<Vec<_>, _>>()?;

  merge_bundles(&bundles)
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;
  use tracing_test::traced_test;

  fn bundle(entries: &[(&str, &str)]) -> Bundle {
    let mut b = Bundle::new();
    for (path, contents) in entries {
      b.push(*path, contents.as_bytes().to_vec()).unwrap();
    }
    b
  }

  #[test]
  fn merging_nothing_yields_empty_bundle() {
    let merged = merge_bundles(std::iter::empty()).unwrap();
    assert!(merged.is_empty());
  }

  #[test]
  fn single_bundle_is_sorted_copy() {
    let only = bundle(&[("z.cue", "z"), ("a.cue", "a")]);
    let merged = merge_bundles([&only]).unwrap();
    assert_eq!(merged.paths().collect::<Vec<_>>(), vec!["a.cue", "z.cue"]);
    assert_eq!(merged.get("z.cue"), Some(&b"z"[..]));
  }

  #[test]
  fn later_bundle_wins_on_collision() {
    let dependency = bundle(&[("x", "from dependency"), ("dep_only", "d")]);
    let dependent = bundle(&[("x", "from dependent")]);

    let merged = merge_bundles([&dependency, &dependent]).unwrap();
    assert_eq!(merged.get("x"), Some(&b"from dependent"[..]));
    assert_eq!(merged.get("dep_only"), Some(&b"d"[..]));
    assert_eq!(merged.len(), 2);

    // Reversing the order reverses the winner.
    let reversed = merge_bundles([&dependent, &dependency]).unwrap();
    assert_eq!(reversed.get("x"), Some(&b"from dependency"[..]));
  }

  #[test]
  fn merge_is_byte_deterministic() {
    let a = bundle(&[("cue.mod/pkg/a/a.cue", "a: 1")]);
    let b = bundle(&[("cue.mod/pkg/b/b.cue", "b: 1"), ("main.cue", "m")]);

    let first = merge_bundles([&a, &b]).unwrap().to_bytes().unwrap();
    let second = merge_bundles([&a, &b]).unwrap().to_bytes().unwrap();
    assert_eq!(first, second);
  }

  #[test]
  fn disjoint_sibling_order_is_invisible() {
    let left = bundle(&[("cue.mod/pkg/left/l.cue", "l")]);
    let right = bundle(&[("cue.mod/pkg/right/r.cue", "r")]);
    let main = bundle(&[("main.cue", "m")]);

    let one = merge_bundles([&left, &right, &main]).unwrap().to_bytes().unwrap();
    let two = merge_bundles([&right, &left, &main]).unwrap().to_bytes().unwrap();
    assert_eq!(one, two);
  }

  #[test]
  fn merge_files_reads_in_order() {
    let temp = TempDir::new().unwrap();
    let first = temp.path().join("first.zip");
    let second = temp.path().join("second.zip");
    bundle(&[("x", "1")]).write_to(&first).unwrap();
    bundle(&[("x", "2")]).write_to(&second).unwrap();

    let merged = merge_files(&[&first, &second]).unwrap();
    assert_eq!(merged.get("x"), Some(&b"2"[..]));
  }

  #[test]
  fn merge_files_fails_on_any_bad_input() {
    let temp = TempDir::new().unwrap();
    let good = temp.path().join("good.zip");
    let bad = temp.path().join("bad.zip");
    bundle(&[("x", "1")]).write_to(&good).unwrap();
    std::fs::write(&bad, b"not a zip").unwrap();

    let result = merge_files(&[&good, &bad]);
    assert!(matches!(result, Err(BundleError::Malformed { .. })));

    let missing = merge_files(&[good, temp.path().join("missing.zip")]);
    assert!(matches!(missing, Err(BundleError::Read { .. })));
  }

  #[test]
  fn file_shadowing_a_package_directory_is_rejected() {
    let shallow = bundle(&[("cue.mod/pkg/a/b.cue", "b: 1")]);
    let deep = bundle(&[("cue.mod/pkg/a/b.cue/x.cue", "x: 1")]);

    for order in [[&shallow, &deep], [&deep, &shallow]] {
      let err = merge_bundles(order).unwrap_err();
      assert!(matches!(
        &err,
        BundleError::PathConflict { file, nested }
          if file == "cue.mod/pkg/a/b.cue" && nested == "cue.mod/pkg/a/b.cue/x.cue"
      ));
    }
  }

  #[test]
  fn merge_files_rejects_path_conflicts() {
    let temp = TempDir::new().unwrap();
    let first = temp.path().join("first.zip");
    let second = temp.path().join("second.zip");
    bundle(&[("lib/defs.cue", "a")]).write_to(&first).unwrap();
    bundle(&[("lib/defs.cue/extra.cue", "b")]).write_to(&second).unwrap();

    let result = merge_files(&[&first, &second]);
    assert!(matches!(result, Err(BundleError::PathConflict { .. })));
  }

  #[test]
  #[traced_test]
  fn overrides_are_logged() {
    let dependency = bundle(&[("shared.cue", "old")]);
    let dependent = bundle(&[("shared.cue", "new")]);

    merge_bundles([&dependency, &dependent]).unwrap();

    assert!(logs_contain("entry overridden"));
  }
}
