use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while declaring packages and targets.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PackageError {
  #[error("invalid label '{label}': {reason}")]
  InvalidLabel { label: String, reason: &'static str },

  #[error("invalid import path '{path}': {reason}")]
  InvalidImportPath { path: String, reason: &'static str },

  #[error("target {label} lists source {path} more than once")]
  DuplicateSource { label: Label, path: PathBuf },

  #[error("target {label} has no sources")]
  NoSources { label: Label },

  #[error("unknown output format '{0}' (expected json or yaml)")]
  UnknownOutputFormat(String),
}

/// Name of a target within one build file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Label(pub String);

impl Label {
  /// Parse a label, accepting `[A-Za-z0-9_.-]+`.
  pub fn parse(value: &str) -> Result<Self, PackageError> {
    if value.is_empty() {
      return Err(PackageError::InvalidLabel {
        label: value.to_string(),
        reason: "label is empty",
      });
    }
    if value == "." || value == ".." {
      return Err(PackageError::InvalidLabel {
        label: value.to_string(),
        reason: "label cannot be a relative directory name",
      });
    }
    if !value
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
      return Err(PackageError::InvalidLabel {
        label: value.to_string(),
        reason: "only ASCII letters, digits, '_', '-' and '.' are allowed",
      });
    }
    Ok(Self(value.to_string()))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for Label {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Logical namespace of a package's sources, e.g. `example.com/schema`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImportPath(String);

impl ImportPath {
  pub fn parse(value: &str) -> Result<Self, PackageError> {
    let invalid = |reason| PackageError::InvalidImportPath {
      path: value.to_string(),
      reason,
    };

    if value.is_empty() {
      return Err(invalid("import path is empty"));
    }
    if value.contains('\\') {
      return Err(invalid("backslashes are not allowed"));
    }
    if value.starts_with('/') || value.ends_with('/') {
      return Err(invalid("leading or trailing '/' is not allowed"));
    }
    for segment in value.split('/') {
      if segment.is_empty() {
        return Err(invalid("empty path segment"));
      }
      if segment == "." || segment == ".." {
        return Err(invalid("relative path segments are not allowed"));
      }
    }
    Ok(Self(value.to_string()))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for ImportPath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl TryFrom<String> for ImportPath {
  type Error = PackageError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    Self::parse(&value)
  }
}

impl From<ImportPath> for String {
  fn from(value: ImportPath) -> Self {
    value.0
  }
}

/// A library target: one import path and its ordered, duplicate-free sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageNode {
  pub label: Label,
  pub import_path: ImportPath,
  srcs: Vec<PathBuf>,
}

impl PackageNode {
  pub fn new(label: Label, import_path: ImportPath, srcs: Vec<PathBuf>) -> Result<Self, PackageError> {
    if srcs.is_empty() {
      return Err(PackageError::NoSources { label });
    }
    let mut seen = HashSet::new();
    for src in &srcs {
      if !seen.insert(src.as_path()) {
        return Err(PackageError::DuplicateSource {
          label,
          path: src.clone(),
        });
      }
    }
    Ok(Self {
      label,
      import_path,
      srcs,
    })
  }

  /// Sources in declaration order.
  pub fn srcs(&self) -> &[PathBuf] {
    &self.srcs
  }
}

/// Output format selector passed to the evaluator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
  #[default]
  Json,
  Yaml,
}

impl OutputFormat {
  pub fn as_str(self) -> &'static str {
    match self {
      OutputFormat::Json => "json",
      OutputFormat::Yaml => "yaml",
    }
  }

  /// File extension used for default output names.
  pub fn extension(self) -> &'static str {
    self.as_str()
  }
}

impl fmt::Display for OutputFormat {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for OutputFormat {
  type Err = PackageError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "json" => Ok(OutputFormat::Json),
      "yaml" | "yml" => Ok(OutputFormat::Yaml),
      _ => Err(PackageError::UnknownOutputFormat(s.to_string())),
    }
  }
}

/// A binary target: an entry file rendered against its dependencies' closure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryTarget {
  pub label: Label,
  pub entry: PathBuf,
  pub output_format: OutputFormat,
  pub escape: bool,
  pub output_name: String,
}

impl BinaryTarget {
  /// Output name used when the declaration does not set one.
  pub fn default_output_name(label: &Label, format: OutputFormat) -> String {
    format!("{}.{}", label, format.extension())
  }

  /// Path of the entry file inside the merged bundle.
  pub fn entry_name(&self) -> Option<String> {
    file_name(&self.entry)
  }
}

pub(crate) fn file_name(path: &Path) -> Option<String> {
  path.file_name().and_then(|n| n.to_str()).map(str::to_string)
}
