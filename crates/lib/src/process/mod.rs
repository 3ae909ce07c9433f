//! External process execution.
//!
//! Every external program the build drives goes through [`ProcessRunner`]. An
//! [`Invocation`] names the program, its arguments, working directory and
//! extra environment; a [`ProcessOutput`] carries the exit code and captured
//! output streams. [`SystemRunner`] spawns real processes with tokio; tests
//! substitute a recording runner.
//!
//! Processes run in an isolated environment:
//! - All inherited environment variables are cleared
//! - `PATH` is passed through so the program can be located
//! - `LANG` and `LC_ALL` are set to `C`
//! - `SOURCE_DATE_EPOCH` is fixed to the zip epoch
//! - The invocation's own environment is applied last

use std::collections::BTreeMap;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::consts::SOURCE_DATE_EPOCH;

/// A fully specified program run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
  pub program: String,
  pub args: Vec<String>,
  pub cwd: PathBuf,
  pub env: BTreeMap<String, String>,
}

impl Invocation {
  pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
    Self {
      program: program.into(),
      args: Vec::new(),
      cwd: cwd.into(),
      env: BTreeMap::new(),
    }
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.env.insert(key.into(), value.into());
    self
  }

  /// Program and arguments joined for log and error messages.
  pub fn command_line(&self) -> String {
    std::iter::once(self.program.as_str())
      .chain(self.args.iter().map(String::as_str))
      .collect::<Vec<_>>()
      .join(" ")
  }
}

/// Exit status and captured streams of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
  /// `None` when the process was terminated by a signal.
  pub code: Option<i32>,
  pub stdout: Vec<u8>,
  pub stderr: Vec<u8>,
}

impl ProcessOutput {
  pub fn success(&self) -> bool {
    self.code == Some(0)
  }
}

/// Runs invocations to completion.
///
/// `Err` means the process could not be started at all; a process that ran
/// and failed is an `Ok` with a non-zero code.
pub trait ProcessRunner: Send + Sync {
  fn run(&self, invocation: &Invocation) -> impl Future<Output = io::Result<ProcessOutput>> + Send;
}

/// Spawns real processes with `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
  fn run(&self, invocation: &Invocation) -> impl Future<Output = io::Result<ProcessOutput>> + Send {
    let mut command = Command::new(&invocation.program);
    command
      .args(&invocation.args)
      .current_dir(&invocation.cwd)
      .env_clear()
      .env("LANG", "C")
      .env("LC_ALL", "C")
      .env("SOURCE_DATE_EPOCH", SOURCE_DATE_EPOCH)
      .stdin(Stdio::null())
      .kill_on_drop(true);

    if let Some(path) = std::env::var_os("PATH") {
      command.env("PATH", path);
    }
    command.envs(&invocation.env);

    let program = invocation.program.clone();
    let cwd = invocation.cwd.clone();

    async move {
      debug!(program = %program, cwd = %cwd.display(), "spawning process");
      let output = command.output().await?;
      let code = output.status.code();
      debug!(program = %program, code = ?code, stdout_bytes = output.stdout.len(), "process exited");
      Ok(ProcessOutput {
        code,
        stdout: output.stdout,
        stderr: output.stderr,
      })
    }
  }
}
