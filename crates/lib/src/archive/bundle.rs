//! The `Bundle` type and its on-disk zip encoding.

use std::collections::HashSet;
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::util::hash::{ContentHash, hash_bytes};

/// Errors reading, writing or validating bundles.
#[derive(Debug, Error)]
pub enum BundleError {
  #[error("failed to read bundle {}: {source}", .path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to write {}: {source}", .path.display())]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid bundle {origin}: {message}")]
  Malformed { origin: String, message: String },

  #[error("failed to encode bundle: {0}")]
  Encode(String),

  #[error("invalid entry path '{path}': {reason}")]
  InvalidEntryPath { path: String, reason: &'static str },

  #[error("duplicate entry '{0}' in bundle")]
  DuplicateEntry(String),

  #[error("entry '{file}' is a file but '{nested}' needs it to be a directory")]
  PathConflict { file: String, nested: String },
}

/// One file inside a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleEntry {
  /// Relative, `/`-separated path.
  pub path: String,
  pub contents: Vec<u8>,
}

/// An ordered sequence of uniquely-pathed entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bundle {
  entries: Vec<BundleEntry>,
}

impl Bundle {
  pub fn new() -> Self {
    Self::default()
  }

  /// Build a bundle from entries, validating paths and uniqueness.
  ///
  /// No entry may sit below another entry's path, since one of the two
  /// could not be materialized.
  pub fn from_entries(entries: Vec<BundleEntry>) -> Result<Self, BundleError> {
    let mut seen = HashSet::with_capacity(entries.len());
    for entry in &entries {
      validate_entry_path(&entry.path)?;
      if !seen.insert(entry.path.as_str()) {
        return Err(BundleError::DuplicateEntry(entry.path.clone()));
      }
    }
    for entry in &entries {
      if let Some(file) = ancestors(&entry.path).find(|dir| seen.contains(dir)) {
        return Err(BundleError::PathConflict {
          file: file.to_string(),
          nested: entry.path.clone(),
        });
      }
    }
    Ok(Self { entries })
  }

  /// Append an entry at the end of the bundle.
  pub fn push(&mut self, path: impl Into<String>, contents: Vec<u8>) -> Result<(), BundleError> {
    let path = path.into();
    validate_entry_path(&path)?;
    if self.get(&path).is_some() {
      return Err(BundleError::DuplicateEntry(path));
    }
    if let Some(file) = ancestors(&path).find(|dir| self.get(dir).is_some()) {
      return Err(BundleError::PathConflict {
        file: file.to_string(),
        nested: path.clone(),
      });
    }
    if let Some(nested) = self.paths().find(|p| ancestors(p).any(|dir| dir == path)) {
      return Err(BundleError::PathConflict {
        file: path,
        nested: nested.to_string(),
      });
    }
    self.entries.push(BundleEntry { path, contents });
    Ok(())
  }

  pub fn entries(&self) -> &[BundleEntry] {
    &self.entries
  }

  pub fn get(&self, path: &str) -> Option<&[u8]> {
    self
      .entries
      .iter()
      .find(|e| e.path == path)
      .map(|e| e.contents.as_slice())
  }

  pub fn paths(&self) -> impl Iterator<Item = &str> {
    self.entries.iter().map(|e| e.path.as_str())
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Encode as a zip archive.
  ///
  /// Entries are written in bundle order with a fixed timestamp and fixed
  /// permissions, so the output depends only on paths and contents.
  pub fn to_bytes(&self) -> Result<Vec<u8>, BundleError> {
    let options = SimpleFileOptions::default()
      .compression_method(CompressionMethod::Deflated)
      .last_modified_time(DateTime::default())
      .unix_permissions(0o644);

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for entry in &self.entries {
      writer
        .start_file(entry.path.as_str(), options)
        .map_err(|e| BundleError::Encode(e.to_string()))?;
      writer
        .write_all(&entry.contents)
        .map_err(|e| BundleError::Encode(e.to_string()))?;
    }
    let cursor = writer.finish().map_err(|e| BundleError::Encode(e.to_string()))?;
    Ok(cursor.into_inner())
  }

  /// Decode a zip archive. `origin` names the source in error messages.
  ///
  /// Directory entries are skipped; every file entry must have a valid,
  /// unique path.
  pub fn from_bytes(bytes: &[u8], origin: &str) -> Result<Self, BundleError> {
    let malformed = |message: String| BundleError::Malformed {
      origin: origin.to_string(),
      message,
    };

    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|e| malformed(e.to_string()))?;
    let mut entries = Vec::with_capacity(archive.len());

    for i in 0..archive.len() {
      let mut file = archive.by_index(i).map_err(|e| malformed(e.to_string()))?;
      if file.is_dir() {
        continue;
      }
      let path = file.name().to_string();
      let mut contents = Vec::new();
      file
        .read_to_end(&mut contents)
        .map_err(|e| malformed(format!("{}: {}", path, e)))?;
      entries.push(BundleEntry { path, contents });
    }

    Self::from_entries(entries)
  }

  /// Read and decode a bundle file.
  pub fn read_from(path: &Path) -> Result<Self, BundleError> {
    let bytes = fs::read(path).map_err(|source| BundleError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_bytes(&bytes, &path.display().to_string())
  }

  /// Encode and write the bundle to `path`, returning the digest of the bytes.
  ///
  /// The file is written to a temporary sibling first and then renamed, so a
  /// failure never leaves a partial bundle at `path`.
  pub fn write_to(&self, path: &Path) -> Result<ContentHash, BundleError> {
    let bytes = self.to_bytes()?;
    write_atomic(path, &bytes)?;
    let digest = hash_bytes(&bytes);
    debug!(path = %path.display(), entries = self.len(), digest = %digest, "wrote bundle");
    Ok(digest)
  }

  /// Digest of the encoded bundle.
  pub fn digest(&self) -> Result<ContentHash, BundleError> {
    Ok(hash_bytes(&self.to_bytes()?))
  }

  /// Write every entry as a file below `dir`.
  pub fn materialize(&self, dir: &Path) -> Result<(), BundleError> {
    for entry in &self.entries {
      let dest = dir.join(&entry.path);
      if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|source| BundleError::Write {
          path: parent.to_path_buf(),
          source,
        })?;
      }
      fs::write(&dest, &entry.contents).map_err(|source| BundleError::Write { path: dest, source })?;
    }
    Ok(())
  }
}

/// Write `contents` to `path` through a temporary file in the same directory.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), BundleError> {
  let dir = match path.parent() {
    Some(p) if !p.as_os_str().is_empty() => p,
    _ => Path::new("."),
  };
  let write_err = |source| BundleError::Write {
    path: path.to_path_buf(),
    source,
  };

  fs::create_dir_all(dir).map_err(write_err)?;
  let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
  tmp.write_all(contents).map_err(write_err)?;
  tmp.persist(path).map_err(|e| write_err(e.error))?;
  Ok(())
}

/// Every proper directory prefix of `path`: `a/b/c` yields `a` then `a/b`.
fn ancestors(path: &str) -> impl Iterator<Item = &str> {
  path.match_indices('/').map(move |(idx, _)| &path[..idx])
}

/// Check that a bundle entry path is relative, `/`-separated and free of
/// empty, `.` and `..` segments.
pub fn validate_entry_path(path: &str) -> Result<(), BundleError> {
  let invalid = |reason| BundleError::InvalidEntryPath {
    path: path.to_string(),
    reason,
  };

  if path.is_empty() {
    return Err(invalid("path is empty"));
  }
  if path.contains('\\') {
    return Err(invalid("backslashes are not allowed"));
  }
  if path.starts_with('/') {
    return Err(invalid("absolute paths are not allowed"));
  }
  for segment in path.split('/') {
    match segment {
      "" => return Err(invalid("empty path segment")),
      "." | ".." => return Err(invalid("relative path segments are not allowed")),
      _ => {}
    }
  }
  Ok(())
}
