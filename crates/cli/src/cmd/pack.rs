//! Implementation of the `cuebuild pack` command.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};

use cuebuild_lib::archive::PackManifest;

use crate::output::{DIGEST_LEN, print_success};

/// Package the sources named by a pack manifest into one bundle.
pub fn cmd_pack(manifest: &Path, output: &Path) -> Result<ExitCode> {
  let pack = PackManifest::load(manifest).context("Failed to load pack manifest")?;
  let bundle = pack
    .pack()
    .with_context(|| format!("Failed to package {}", pack.import_path))?;
  let digest = bundle
    .write_to(output)
    .with_context(|| format!("Failed to write bundle: {}", output.display()))?;

  print_success(&format!(
    "Packed {} file(s) of {} into {} [{}]",
    bundle.len(),
    pack.import_path,
    output.display(),
    digest.short(DIGEST_LEN)
  ));
  Ok(ExitCode::SUCCESS)
}
