//! Manifest types for cuebuild.
//!
//! The manifest captures every target declared by a build file. It is produced
//! by evaluating Lua and consumed by [`crate::graph::BuildGraph`], which turns
//! it into validated [`crate::package::PackageNode`]s and
//! [`crate::package::BinaryTarget`]s.
//!
//! # Structure
//!
//! - `libraries`: library declarations keyed by [`Label`]
//! - `binaries`: binary declarations keyed by [`Label`]
//!
//! # Ordering
//!
//! Both maps are [`BTreeMap`]s so serialization and graph construction are
//! deterministic. Dependency lists keep declaration order, which is the order
//! closures are concatenated in.
//!
//! # Example
//!
//! ```json
//! {
//!   "libraries": {
//!     "schema": { "import_path": "example.com/schema", "srcs": ["/src/defs.cue"], "deps": [] }
//!   },
//!   "binaries": {
//!     "config": { "src": "/src/main.cue", "deps": ["schema"], "output_format": "yaml", "escape": false }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::package::{Label, OutputFormat};

/// A `cuebuild.library{}` declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryDecl {
  pub import_path: String,
  pub srcs: Vec<PathBuf>,
  #[serde(default)]
  pub deps: Vec<Label>,
}

/// A `cuebuild.binary{}` declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryDecl {
  pub src: PathBuf,
  #[serde(default)]
  pub deps: Vec<Label>,
  #[serde(default)]
  pub output_format: OutputFormat,
  #[serde(default)]
  pub escape: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub output_name: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
  pub libraries: BTreeMap<Label, LibraryDecl>,
  pub binaries: BTreeMap<Label, BinaryDecl>,
}

impl Manifest {
  /// Whether a label is already declared by any target.
  pub fn contains(&self, label: &Label) -> bool {
    self.libraries.contains_key(label) || self.binaries.contains_key(label)
  }

  pub fn target_count(&self) -> usize {
    self.libraries.len() + self.binaries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.target_count() == 0
  }
}
