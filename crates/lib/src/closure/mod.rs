//! Transitive dependency closures.
//!
//! A [`Closure`] is the ordered list of bundles a node needs: every
//! dependency's closure, in declaration order, followed by the node's own
//! bundle. Each distinct node appears exactly once; when the same node is
//! reached through several dependencies its first occurrence is kept and later
//! repeats are dropped. Because a node always follows its own dependencies in
//! the closure it came from, keeping first occurrences preserves postorder.
//!
//! Closures are plain values. A node's build step returns its closure and the
//! scheduler hands it to dependents explicitly.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::package::{ImportPath, Label};

/// Configuration errors detected while folding closures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClosureError {
  #[error("dependency cycle: {0} depends on itself")]
  Cycle(Label),

  #[error("import path {import_path} is declared by both {first} and {second}")]
  DuplicateImportPath {
    import_path: ImportPath,
    first: Label,
    second: Label,
  },

  #[error("target {0} appears in closures with different import paths or bundles")]
  InconsistentNode(Label),
}

/// One node's bundle within a closure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosureEntry {
  pub label: Label,
  pub import_path: ImportPath,
  pub bundle: PathBuf,
}

/// Ordered, deduplicated bundles of a node and its transitive dependencies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Closure {
  entries: Vec<ClosureEntry>,
}

impl Closure {
  pub fn entries(&self) -> &[ClosureEntry] {
    &self.entries
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn contains(&self, label: &Label) -> bool {
    self.entries.iter().any(|e| &e.label == label)
  }

  pub fn labels(&self) -> impl Iterator<Item = &Label> {
    self.entries.iter().map(|e| &e.label)
  }

  /// Bundle files in merge order.
  pub fn bundle_paths(&self) -> impl Iterator<Item = &Path> {
    self.entries.iter().map(|e| e.bundle.as_path())
  }
}

/// Compute a library's closure from its own entry and its direct
/// dependencies' closures (in declaration order).
pub fn collect(own: ClosureEntry, deps: &[&Closure]) -> Result<Closure, ClosureError> {
  if deps.iter().any(|c| c.contains(&own.label)) {
    return Err(ClosureError::Cycle(own.label));
  }
  fold(deps.iter().flat_map(|c| c.entries.iter()).chain(std::iter::once(&own)))
}

/// Compute the closure of a dependency list alone, as a binary target needs.
pub fn collect_dependencies(deps: &[&Closure]) -> Result<Closure, ClosureError> {
  fold(deps.iter().flat_map(|c| c.entries.iter()))
}

fn fold<'a>(candidates: impl Iterator<Item = &'a ClosureEntry>) -> Result<Closure, ClosureError> {
  let mut seen: HashMap<&Label, &ClosureEntry> = HashMap::new();
  let mut owners: HashMap<&ImportPath, &Label> = HashMap::new();
  let mut entries = Vec::new();

  for entry in candidates {
    if let Some(first) = seen.get(&entry.label) {
      if *first != entry {
        return Err(ClosureError::InconsistentNode(entry.label.clone()));
      }
      continue;
    }

    if let Some(owner) = owners.get(&entry.import_path) {
      return Err(ClosureError::DuplicateImportPath {
        import_path: entry.import_path.clone(),
        first: (*owner).clone(),
        second: entry.label.clone(),
      });
    }

    seen.insert(&entry.label, entry);
    owners.insert(&entry.import_path, &entry.label);
    entries.push(entry.clone());
  }

  debug_assert_eq!(
    entries.iter().map(|e| &e.label).collect::<HashSet<_>>().len(),
    entries.len()
  );

  Ok(Closure { entries })
}
