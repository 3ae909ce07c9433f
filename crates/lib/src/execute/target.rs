//! Realizing a single library or binary.
//!
//! Each step runs strictly in sequence: closure, bundle, merge, render. Outputs
//! are only written once everything they depend on has succeeded, and a
//! target's stale outputs from an earlier run are removed first, so a failed
//! target leaves nothing behind.

use std::io;
use std::path::Path;

use tracing::{debug, info};

use crate::archive::{Bundle, build_entry_bundle, build_package_bundle, bundle::write_atomic, merge_bundles};
use crate::closure::{self, Closure, ClosureEntry};
use crate::package::{BinaryTarget, PackageNode};
use crate::process::ProcessRunner;
use crate::render::{Evaluator, RenderError};
use crate::util::hash::hash_bytes;

use super::types::{BinaryOutput, ExecuteConfig, ExecuteError, LibraryOutput};

/// Package a library and compute its closure.
///
/// `deps` are the closures of the library's direct dependencies in
/// declaration order.
pub async fn realize_library(
  node: &PackageNode,
  deps: &[&Closure],
  config: &ExecuteConfig,
) -> Result<LibraryOutput, ExecuteError> {
  let bundle_path = config.library_bundle(&node.label);
  remove_stale(&bundle_path)?;

  let own = ClosureEntry {
    label: node.label.clone(),
    import_path: node.import_path.clone(),
    bundle: bundle_path.clone(),
  };
  let closure = closure::collect(own, deps)?;

  let bundle = build_package_bundle(&node.import_path, node.srcs())?;
  let digest = bundle.write_to(&bundle_path)?;

  info!(
    target = %node.label,
    import_path = %node.import_path,
    closure = closure.len(),
    digest = %digest,
    "library packaged"
  );

  Ok(LibraryOutput {
    bundle: bundle_path,
    digest,
    closure,
  })
}

/// Merge a binary's entry with its dependencies' closure and render it.
///
/// The entry bundle is merged last so its files win over anything inherited.
pub async fn realize_binary<R: ProcessRunner>(
  target: &BinaryTarget,
  deps: &[&Closure],
  evaluator: &Evaluator<R>,
  config: &ExecuteConfig,
) -> Result<BinaryOutput, ExecuteError> {
  let merged_path = config.merged_bundle(&target.label);
  let artifact_path = config.artifact(&target.output_name);
  remove_stale(&merged_path)?;
  remove_stale(&artifact_path)?;

  let closure = closure::collect_dependencies(deps)?;
  let entry_bundle = build_entry_bundle(&target.entry)?;
  let entry_name = target
    .entry_name()
    .ok_or_else(|| RenderError::EntryNotFound(target.entry.display().to_string()))?;

  let inherited = closure
    .bundle_paths()
    .map(Bundle::read_from)
    .collect::<Result<Vec<_>, _>>()?;
  let merged = merge_bundles(inherited.iter().chain(std::iter::once(&entry_bundle)))?;
  debug!(target = %target.label, bundles = inherited.len() + 1, entries = merged.len(), "merged closure");

  let rendered = evaluator
    .render(&merged, &entry_name, target.output_format, target.escape)
    .await?;

  let merged_digest = merged.write_to(&merged_path)?;
  if let Err(e) = write_atomic(&artifact_path, &rendered) {
    let _ = std::fs::remove_file(&merged_path);
    return Err(e.into());
  }
  let artifact_digest = hash_bytes(&rendered);

  info!(
    target = %target.label,
    artifact = %artifact_path.display(),
    format = %target.output_format,
    digest = %artifact_digest,
    "binary rendered"
  );

  Ok(BinaryOutput {
    merged: merged_path,
    merged_digest,
    artifact: artifact_path,
    artifact_digest,
    closure,
  })
}

fn remove_stale(path: &Path) -> Result<(), ExecuteError> {
  match std::fs::remove_file(path) {
    Ok(()) => {
      debug!(path = %path.display(), "removed stale output");
      Ok(())
    }
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
    Err(source) => Err(ExecuteError::WriteOutput {
      path: path.to_path_buf(),
      source,
    }),
  }
}
