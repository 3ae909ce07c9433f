//! Packaging sources into bundles.
//!
//! A library's file `defs.cue` with import path `example.com/schema` lands at
//! `cue.mod/pkg/example.com/schema/defs.cue`. A binary's entry file lands at
//! the bundle root under its own file name.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::PKG_ROOT;
use crate::package::{ImportPath, file_name};

use super::bundle::{Bundle, BundleError};

#[derive(Debug, Error)]
pub enum BuilderError {
  #[error("failed to read source {}: {source}", .path.display())]
  ReadSource {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("source {} has no usable file name", .0.display())]
  NoFileName(PathBuf),

  #[error("sources {} and {} both map to bundle entry '{entry}'", .first.display(), .second.display())]
  EntryCollision {
    entry: String,
    first: PathBuf,
    second: PathBuf,
  },

  #[error("failed to read pack manifest {}: {message}", .path.display())]
  Manifest { path: PathBuf, message: String },

  #[error(transparent)]
  Bundle(#[from] BundleError),
}

/// Bundle path of a library source file.
pub fn package_entry_path(import_path: &ImportPath, file_name: &str) -> String {
  format!("{}/{}/{}", PKG_ROOT, import_path, file_name)
}

/// Package one library's sources, in declaration order, under its import path.
pub fn build_package_bundle(import_path: &ImportPath, srcs: &[PathBuf]) -> Result<Bundle, BuilderError> {
  let mut bundle = Bundle::new();
  let mut origins: Vec<(String, &Path)> = Vec::with_capacity(srcs.len());

  for src in srcs {
    let name = file_name(src).ok_or_else(|| BuilderError::NoFileName(src.clone()))?;
    let entry = package_entry_path(import_path, &name);

    if let Some((_, first)) = origins.iter().find(|(e, _)| *e == entry) {
      return Err(BuilderError::EntryCollision {
        entry,
        first: first.to_path_buf(),
        second: src.clone(),
      });
    }

    let contents = read_source(src)?;
    bundle.push(entry.clone(), contents)?;
    origins.push((entry, src.as_path()));
  }

  debug!(import_path = %import_path, entries = bundle.len(), "packaged library sources");
  Ok(bundle)
}

/// Package a binary's entry file at the bundle root.
pub fn build_entry_bundle(entry: &Path) -> Result<Bundle, BuilderError> {
  let name = file_name(entry).ok_or_else(|| BuilderError::NoFileName(entry.to_path_buf()))?;
  let contents = read_source(entry)?;
  let mut bundle = Bundle::new();
  bundle.push(name, contents)?;
  Ok(bundle)
}

fn read_source(path: &Path) -> Result<Vec<u8>, BuilderError> {
  fs::read(path).map_err(|source| BuilderError::ReadSource {
    path: path.to_path_buf(),
    source,
  })
}

/// Input of the standalone source packager (`cuebuild pack`).
///
/// ```json
/// { "import_path": "example.com/schema", "srcs": ["defs.cue", "types.cue"] }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackManifest {
  pub import_path: ImportPath,
  pub srcs: Vec<PathBuf>,
}

impl PackManifest {
  /// Load a manifest, resolving relative sources against its directory.
  pub fn load(path: &Path) -> Result<Self, BuilderError> {
    let content = fs::read_to_string(path).map_err(|e| BuilderError::Manifest {
      path: path.to_path_buf(),
      message: e.to_string(),
    })?;
    let mut manifest: PackManifest = serde_json::from_str(&content).map_err(|e| BuilderError::Manifest {
      path: path.to_path_buf(),
      message: e.to_string(),
    })?;

    let base = path.parent().unwrap_or(Path::new("."));
    for src in &mut manifest.srcs {
      if src.is_relative() {
        *src = base.join(&*src);
      }
    }
    Ok(manifest)
  }

  pub fn pack(&self) -> Result<Bundle, BuilderError> {
    build_package_bundle(&self.import_path, &self.srcs)
  }
}
