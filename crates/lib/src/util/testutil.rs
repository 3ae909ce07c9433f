//! Test utilities for cuebuild-lib.
//!
//! Helpers for writing fixture files, running shell snippets and standing in
//! for the external evaluator.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::process::{Invocation, ProcessOutput, ProcessRunner};

/// Write `content` to `dir/rel`, creating parent directories.
pub fn write_file(dir: &Path, rel: &str, content: &str) -> PathBuf {
  let path = dir.join(rel);
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent).unwrap();
  }
  std::fs::write(&path, content).unwrap();
  path
}

/// Returns the shell command and args to execute a shell script.
#[cfg(unix)]
pub fn shell_cmd(script: &str) -> (&'static str, Vec<String>) {
  ("/bin/sh", vec!["-c".to_string(), script.to_string()])
}

#[cfg(windows)]
pub fn shell_cmd(script: &str) -> (&'static str, Vec<String>) {
  ("cmd.exe", vec!["/C".to_string(), script.to_string()])
}

type Handler = dyn Fn(&Invocation) -> io::Result<ProcessOutput> + Send + Sync;

/// A [`ProcessRunner`] that answers with a closure and records every call.
///
/// The handler runs while the invocation's working directory still exists,
/// so it can inspect materialized files.
#[derive(Clone)]
pub struct MockRunner {
  handler: Arc<Handler>,
  calls: Arc<Mutex<Vec<Invocation>>>,
}

impl MockRunner {
  pub fn new(handler: impl Fn(&Invocation) -> io::Result<ProcessOutput> + Send + Sync + 'static) -> Self {
    Self {
      handler: Arc::new(handler),
      calls: Arc::new(Mutex::new(Vec::new())),
    }
  }

  /// Succeeds with fixed stdout.
  pub fn succeeding(stdout: &str) -> Self {
    let stdout = stdout.as_bytes().to_vec();
    Self::new(move |_| {
      Ok(ProcessOutput {
        code: Some(0),
        stdout: stdout.clone(),
        stderr: Vec::new(),
      })
    })
  }

  /// Exits with `code` and fixed stderr.
  pub fn failing(code: i32, stderr: &str) -> Self {
    let stderr = stderr.as_bytes().to_vec();
    Self::new(move |_| {
      Ok(ProcessOutput {
        code: Some(code),
        stdout: Vec::new(),
        stderr: stderr.clone(),
      })
    })
  }

  /// Concatenates every file below the working directory, sorted by relative
  /// path, as `path:\n<content>` blocks. Output depends only on bundle
  /// contents, like a real evaluator.
  pub fn concatenating() -> Self {
    Self::new(|invocation| {
      let mut files = Vec::new();
      collect_files(&invocation.cwd, &invocation.cwd, &mut files)?;
      files.sort();
      let mut stdout = Vec::new();
      for (rel, contents) in files {
        stdout.extend_from_slice(rel.as_bytes());
        stdout.extend_from_slice(b":\n");
        stdout.extend_from_slice(&contents);
      }
      Ok(ProcessOutput {
        code: Some(0),
        stdout,
        stderr: Vec::new(),
      })
    })
  }

  pub fn calls(&self) -> Vec<Invocation> {
    self.calls.lock().unwrap().clone()
  }
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<(String, Vec<u8>)>) -> io::Result<()> {
  for entry in std::fs::read_dir(dir)? {
    let path = entry?.path();
    if path.is_dir() {
      collect_files(root, &path, out)?;
    } else {
      let rel = path
        .strip_prefix(root)
        .map_err(io::Error::other)?
        .to_string_lossy()
        .replace('\\', "/");
      out.push((rel, std::fs::read(&path)?));
    }
  }
  Ok(())
}

impl ProcessRunner for MockRunner {
  fn run(&self, invocation: &Invocation) -> impl std::future::Future<Output = io::Result<ProcessOutput>> + Send {
    self.calls.lock().unwrap().push(invocation.clone());
    std::future::ready((self.handler)(invocation))
  }
}
