//! Rendering merged bundles with the external evaluator.
//!
//! The bundle is unpacked into a fresh scratch directory and the evaluator is
//! run there as `<program> export --out <format> [--escape] <entry>`. Standard
//! output becomes the artifact. A non-zero exit fails the render with the
//! evaluator's stderr carried through unchanged; nothing is retried.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::archive::{Bundle, BundleError};
use crate::consts::DEFAULT_EVALUATOR;
use crate::package::OutputFormat;
use crate::process::{Invocation, ProcessRunner, SystemRunner};

#[derive(Debug, Error)]
pub enum RenderError {
  #[error("entry '{0}' is not present in the merged bundle")]
  EntryNotFound(String),

  #[error("failed to prepare scratch workspace {}: {source}", .path.display())]
  Workspace {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error(transparent)]
  Bundle(#[from] BundleError),

  #[error("failed to start evaluator '{program}': {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  /// `stderr` holds the evaluator's raw bytes; only `Display` decodes them.
  #[error(
    "evaluator '{program}' exited with {}:\n{}",
    exit_description(.code),
    String::from_utf8_lossy(.stderr)
  )]
  ToolFailed {
    program: String,
    code: Option<i32>,
    stderr: Vec<u8>,
  },
}

fn exit_description(code: &Option<i32>) -> String {
  match code {
    Some(code) => format!("code {}", code),
    None => "a signal".to_string(),
  }
}

/// Drives the evaluator program through a [`ProcessRunner`].
#[derive(Debug)]
pub struct Evaluator<R> {
  program: String,
  runner: Arc<R>,
}

impl<R> Clone for Evaluator<R> {
  fn clone(&self) -> Self {
    Self {
      program: self.program.clone(),
      runner: Arc::clone(&self.runner),
    }
  }
}

impl Evaluator<SystemRunner> {
  /// Evaluator backed by real processes.
  pub fn system(program: impl Into<String>) -> Self {
    Self::new(program, SystemRunner)
  }
}

impl Default for Evaluator<SystemRunner> {
  fn default() -> Self {
    Self::system(DEFAULT_EVALUATOR)
  }
}

impl<R: ProcessRunner> Evaluator<R> {
  pub fn new(program: impl Into<String>, runner: R) -> Self {
    Self {
      program: program.into(),
      runner: Arc::new(runner),
    }
  }

  pub fn program(&self) -> &str {
    &self.program
  }

  /// Evaluator arguments for one render.
  pub fn arguments(entry: &str, format: OutputFormat, escape: bool) -> Vec<String> {
    let mut args = vec!["export".to_string(), "--out".to_string(), format.as_str().to_string()];
    if escape {
      args.push("--escape".to_string());
    }
    args.push(entry.to_string());
    args
  }

  /// Render `entry` from `bundle` and return the evaluator's standard output.
  pub async fn render(
    &self,
    bundle: &Bundle,
    entry: &str,
    format: OutputFormat,
    escape: bool,
  ) -> Result<Vec<u8>, RenderError> {
    if bundle.get(entry).is_none() {
      return Err(RenderError::EntryNotFound(entry.to_string()));
    }

    let scratch = tempfile::Builder::new()
      .prefix("cuebuild-")
      .tempdir()
      .map_err(|source| RenderError::Workspace {
        path: std::env::temp_dir(),
        source,
      })?;
    let work = scratch.path().join("work");
    let home = scratch.path().join("home");
    let tmp = scratch.path().join("tmp");
    for dir in [&work, &home, &tmp] {
      fs::create_dir_all(dir).map_err(|source| RenderError::Workspace {
        path: dir.clone(),
        source,
      })?;
    }

    bundle.materialize(&work)?;
    debug!(workspace = %work.display(), entries = bundle.len(), "materialized bundle");

    let invocation = Invocation::new(&self.program, &work)
      .args(Self::arguments(entry, format, escape))
      .env("HOME", home.to_string_lossy())
      .env("TMPDIR", tmp.to_string_lossy());

    info!(command = %invocation.command_line(), "running evaluator");
    let output = self
      .runner
      .run(&invocation)
      .await
      .map_err(|source| RenderError::Spawn {
        program: self.program.clone(),
        source,
      })?;

    if !output.success() {
      return Err(RenderError::ToolFailed {
        program: self.program.clone(),
        code: output.code,
        stderr: output.stderr,
      });
    }

    debug!(bytes = output.stdout.len(), "evaluator produced output");
    Ok(output.stdout)
  }
}
