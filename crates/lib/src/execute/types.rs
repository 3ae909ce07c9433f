//! Types for target execution.
//!
//! This module defines the error types, per-target outputs and the run report
//! produced by [`super::execute_graph`].

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::archive::{BuilderError, BundleError};
use crate::closure::{Closure, ClosureError};
use crate::graph::GraphError;
use crate::package::Label;
use crate::render::RenderError;
use crate::util::hash::ContentHash;

/// Broad class of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  /// Invalid declarations; detected before any I/O.
  Configuration,
  /// Missing or unreadable sources and bundles, or failed writes.
  Io,
  /// An external program failed or could not be started.
  ExternalTool,
}

impl std::fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ErrorKind::Configuration => write!(f, "configuration error"),
      ErrorKind::Io => write!(f, "I/O error"),
      ErrorKind::ExternalTool => write!(f, "external tool error"),
    }
  }
}

/// Errors that can occur while realizing targets.
#[derive(Debug, Error)]
pub enum ExecuteError {
  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error(transparent)]
  Closure(#[from] ClosureError),

  #[error(transparent)]
  Builder(#[from] BuilderError),

  #[error(transparent)]
  Bundle(#[from] BundleError),

  #[error(transparent)]
  Render(#[from] RenderError),

  #[error("failed to write {}: {source}", .path.display())]
  WriteOutput {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// A dependency's closure was not available when its dependent ran.
  #[error("closure of {dependency} is not available to {target}")]
  MissingClosure { target: Label, dependency: Label },

  #[error("target not found: {0}")]
  TargetNotFound(Label),

  #[error("task for {target} panicked: {message}")]
  TaskPanicked { target: Label, message: String },
}

impl ExecuteError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      ExecuteError::Graph(_) | ExecuteError::Closure(_) | ExecuteError::TargetNotFound(_) => ErrorKind::Configuration,
      ExecuteError::Builder(e) => builder_kind(e),
      ExecuteError::Bundle(_) | ExecuteError::WriteOutput { .. } => ErrorKind::Io,
      ExecuteError::Render(e) => match e {
        RenderError::EntryNotFound(_) => ErrorKind::Configuration,
        RenderError::Workspace { .. } | RenderError::Bundle(_) => ErrorKind::Io,
        RenderError::Spawn { .. } | RenderError::ToolFailed { .. } => ErrorKind::ExternalTool,
      },
      ExecuteError::MissingClosure { .. } | ExecuteError::TaskPanicked { .. } => ErrorKind::Io,
    }
  }
}

fn builder_kind(e: &BuilderError) -> ErrorKind {
  match e {
    BuilderError::ReadSource { .. } | BuilderError::Bundle(_) => ErrorKind::Io,
    BuilderError::NoFileName(_) | BuilderError::EntryCollision { .. } | BuilderError::Manifest { .. } => {
      ErrorKind::Configuration
    }
  }
}

/// Outputs of a realized library.
#[derive(Debug, Clone, Serialize)]
pub struct LibraryOutput {
  pub bundle: PathBuf,
  pub digest: ContentHash,
  /// Dependencies' closures followed by this library's bundle.
  #[serde(skip)]
  pub closure: Closure,
}

/// Outputs of a realized binary.
#[derive(Debug, Clone, Serialize)]
pub struct BinaryOutput {
  pub merged: PathBuf,
  pub merged_digest: ContentHash,
  pub artifact: PathBuf,
  pub artifact_digest: ContentHash,
  /// Closure of the binary's dependencies, in merge order.
  #[serde(skip)]
  pub closure: Closure,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TargetOutput {
  Library(LibraryOutput),
  Binary(BinaryOutput),
}

impl TargetOutput {
  pub fn closure(&self) -> &Closure {
    match self {
      TargetOutput::Library(out) => &out.closure,
      TargetOutput::Binary(out) => &out.closure,
    }
  }
}

/// Result of executing a graph.
#[derive(Debug, Default)]
pub struct BuildReport {
  pub realized: BTreeMap<Label, TargetOutput>,
  pub failed: BTreeMap<Label, ExecuteError>,
  /// Skipped target -> the failed (or skipped) dependency that caused it.
  pub skipped: BTreeMap<Label, Label>,
}

impl BuildReport {
  /// Returns true if every selected target was realized.
  pub fn is_success(&self) -> bool {
    self.failed.is_empty() && self.skipped.is_empty()
  }

  pub fn total(&self) -> usize {
    self.realized.len() + self.failed.len() + self.skipped.len()
  }
}

/// Configuration for graph execution.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// Maximum number of targets realized at once.
  pub parallelism: usize,

  /// Directory receiving bundles and artifacts.
  pub out_dir: PathBuf,
}

impl ExecuteConfig {
  pub fn new(out_dir: impl Into<PathBuf>) -> Self {
    Self {
      parallelism: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
      out_dir: out_dir.into(),
    }
  }

  pub fn with_parallelism(mut self, parallelism: usize) -> Self {
    self.parallelism = parallelism.max(1);
    self
  }

  pub fn library_bundle(&self, label: &Label) -> PathBuf {
    self.out_dir.join(format!("{}.pkg.zip", label))
  }

  pub fn merged_bundle(&self, label: &Label) -> PathBuf {
    self.out_dir.join(format!("{}.merged.zip", label))
  }

  pub fn artifact(&self, output_name: &str) -> PathBuf {
    self.out_dir.join(output_name)
  }
}
