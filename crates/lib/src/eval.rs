//! Build file evaluation.
//!
//! [`evaluate_build_file`] runs a `BUILD.lua` file and returns the
//! [`Manifest`] of every target it declared.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use mlua::prelude::*;
use tracing::{debug, info};

use crate::lua::runtime;
use crate::manifest::Manifest;

/// Errors that can occur during build file evaluation.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
  /// Lua evaluation error.
  #[error("lua error: {0}")]
  Lua(#[from] LuaError),
}

/// Evaluate a build file and return the declared targets.
///
/// # Example
/// ```ignore
/// use std::path::Path;
/// use cuebuild_lib::eval::evaluate_build_file;
///
/// let manifest = evaluate_build_file(Path::new("BUILD.lua"))?;
/// println!("libraries: {}", manifest.libraries.len());
/// ```
pub fn evaluate_build_file(path: &Path) -> Result<Manifest, EvalError> {
  let manifest = Rc::new(RefCell::new(Manifest::default()));

  {
    let lua = runtime::create_runtime(manifest.clone())?;
    debug!(path = %path.display(), "evaluating build file");
    runtime::load_file(&lua, path)?;
  }

  let manifest = manifest.take();
  info!(
    libraries = manifest.libraries.len(),
    binaries = manifest.binaries.len(),
    "build file evaluated"
  );
  Ok(manifest)
}
