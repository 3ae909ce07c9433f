//! Implementation of the `cuebuild merge` command.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};

use cuebuild_lib::archive::merge_files;

use crate::output::{DIGEST_LEN, print_success};

/// Merge `inputs` in order into `output`. Later inputs win on shared paths;
/// no inputs yields an empty bundle.
pub fn cmd_merge(inputs: &[PathBuf], output: &Path) -> Result<ExitCode> {
  let merged = merge_files(inputs).context("Failed to merge bundles")?;
  let digest = merged
    .write_to(output)
    .with_context(|| format!("Failed to write bundle: {}", output.display()))?;

  print_success(&format!(
    "Merged {} bundle(s) into {} ({} entries) [{}]",
    inputs.len(),
    output.display(),
    merged.len(),
    digest.short(DIGEST_LEN)
  ));
  Ok(ExitCode::SUCCESS)
}
