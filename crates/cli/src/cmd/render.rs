//! Implementation of the `cuebuild render` command.
//!
//! Runs the evaluator against one entry of a merged bundle. The rendered
//! output goes to `--output` or stdout; when the evaluator fails its stderr is
//! passed through unchanged and its exit code becomes ours.

use std::io::Write;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};

use cuebuild_lib::archive::Bundle;
use cuebuild_lib::archive::bundle::write_atomic;
use cuebuild_lib::config::{Settings, resolve_program};
use cuebuild_lib::package::OutputFormat;
use cuebuild_lib::render::{Evaluator, RenderError};

pub fn cmd_render(
  bundle: &Path,
  entry: &str,
  format: OutputFormat,
  escape: bool,
  output: Option<&Path>,
  evaluator: Option<String>,
) -> Result<ExitCode> {
  let settings = Settings::from_env().context("Invalid environment settings")?;
  let program = match evaluator {
    Some(flag) => resolve_program(&flag).context("Invalid --evaluator")?,
    None => settings.evaluator,
  };
  let merged = Bundle::read_from(bundle).with_context(|| format!("Failed to read bundle: {}", bundle.display()))?;
  let entry = entry.trim_start_matches("./");

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let rendered = match rt.block_on(Evaluator::system(program).render(&merged, entry, format, escape)) {
    Ok(rendered) => rendered,
    Err(RenderError::ToolFailed { stderr, code, .. }) => {
      let mut err = std::io::stderr().lock();
      err.write_all(&stderr).context("Failed to write to stderr")?;
      err.flush().context("Failed to write to stderr")?;
      return Ok(tool_exit_code(code));
    }
    Err(e) => return Err(e).context("Render failed"),
  };

  match output {
    Some(path) => {
      write_atomic(path, &rendered).with_context(|| format!("Failed to write output: {}", path.display()))?
    }
    None => {
      let mut stdout = std::io::stdout().lock();
      stdout.write_all(&rendered).context("Failed to write to stdout")?;
      stdout.flush().context("Failed to write to stdout")?;
    }
  }

  Ok(ExitCode::SUCCESS)
}

/// Exit code mirroring the evaluator's; never zero.
fn tool_exit_code(code: Option<i32>) -> ExitCode {
  match code.and_then(|c| u8::try_from(c).ok()) {
    Some(c) if c != 0 => ExitCode::from(c),
    _ => ExitCode::FAILURE,
  }
}
