//! Environment-driven settings.
//!
//! | Variable             | Meaning                         | Default                 |
//! |----------------------|---------------------------------|-------------------------|
//! | `CUEBUILD_OUT_DIR`   | Output directory                | `cuebuild-out` (CLI)    |
//! | `CUEBUILD_EVALUATOR` | Evaluator program               | `cue`                   |
//! | `CUEBUILD_JOBS`      | Maximum targets built at once   | available parallelism   |
//!
//! Command-line flags take precedence over these values.
//!
//! An evaluator given as a relative path is anchored to the current directory
//! (see [`resolve_program`]), since the evaluator itself runs elsewhere.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::consts::{DEFAULT_EVALUATOR, ENV_EVALUATOR, ENV_JOBS, ENV_OUT_DIR};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
  #[error("{var} must be a positive integer, got '{value}'")]
  InvalidJobs { var: &'static str, value: String },

  #[error("{0} is set but empty")]
  Empty(&'static str),

  #[error("cannot resolve evaluator path '{program}': {message}")]
  UnresolvedProgram { program: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
  /// Explicit output directory; `None` means next to the build file.
  pub out_dir: Option<PathBuf>,
  pub evaluator: String,
  pub jobs: NonZeroUsize,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      out_dir: None,
      evaluator: DEFAULT_EVALUATOR.to_string(),
      jobs: default_jobs(),
    }
  }
}

impl Settings {
  pub fn from_env() -> Result<Self, SettingsError> {
    let mut settings = Self::default();

    if let Some(dir) = non_empty_var(ENV_OUT_DIR)? {
      settings.out_dir = Some(PathBuf::from(dir));
    }
    if let Some(program) = non_empty_var(ENV_EVALUATOR)? {
      settings.evaluator = resolve_program(&program)?;
    }
    if let Some(value) = non_empty_var(ENV_JOBS)? {
      settings.jobs = parse_jobs(ENV_JOBS, &value)?;
    }

    Ok(settings)
  }
}

/// Parse a job count; zero and non-numbers are rejected.
pub fn parse_jobs(var: &'static str, value: &str) -> Result<NonZeroUsize, SettingsError> {
  value
    .trim()
    .parse::<NonZeroUsize>()
    .map_err(|_| SettingsError::InvalidJobs {
      var,
      value: value.to_string(),
    })
}

/// Resolve an evaluator program against the current directory.
pub fn resolve_program(program: &str) -> Result<String, SettingsError> {
  if !is_relative_path(program) {
    return Ok(program.to_string());
  }
  let cwd = std::env::current_dir().map_err(|e| SettingsError::UnresolvedProgram {
    program: program.to_string(),
    message: e.to_string(),
  })?;
  Ok(resolve_program_in(program, &cwd))
}

/// Anchor a relative program path (`./bin/cue`, `tools/cue`) to `base`.
///
/// Bare names such as `cue` are returned unchanged for `PATH` lookup. A path
/// that does not exist is joined but not canonicalized, so spawning it still
/// reports the missing file.
pub fn resolve_program_in(program: &str, base: &Path) -> String {
  if !is_relative_path(program) {
    return program.to_string();
  }
  let joined = base.join(program);
  dunce::canonicalize(&joined)
    .unwrap_or(joined)
    .to_string_lossy()
    .into_owned()
}

fn is_relative_path(program: &str) -> bool {
  program.chars().any(std::path::is_separator) && Path::new(program).is_relative()
}

fn default_jobs() -> NonZeroUsize {
  std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN)
}

fn non_empty_var(var: &'static str) -> Result<Option<String>, SettingsError> {
  match std::env::var(var) {
    Ok(value) if value.trim().is_empty() => Err(SettingsError::Empty(var)),
    Ok(value) => Ok(Some(value)),
    Err(_) => Ok(None),
  }
}
