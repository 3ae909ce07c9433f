//! Implementation of the `cuebuild build` command.
//!
//! Evaluates a build file, validates its graph and realizes the selected
//! targets into the output directory.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::debug;

use cuebuild_lib::config::{Settings, resolve_program};
use cuebuild_lib::consts::DEFAULT_OUT_DIR;
use cuebuild_lib::eval::evaluate_build_file;
use cuebuild_lib::execute::{BuildReport, ExecuteConfig, TargetOutput, execute_graph};
use cuebuild_lib::graph::BuildGraph;
use cuebuild_lib::manifest::Manifest;
use cuebuild_lib::package::Label;
use cuebuild_lib::render::Evaluator;

use crate::output::{
  DIGEST_LEN, format_duration, print_error, print_info, print_json, print_stat, print_success, print_warning, symbols,
};

/// Flags of `cuebuild build`; unset values fall back to [`Settings`].
pub struct BuildOptions {
  pub file: PathBuf,
  pub targets: Vec<String>,
  pub out_dir: Option<PathBuf>,
  pub jobs: Option<NonZeroUsize>,
  pub evaluator: Option<String>,
  pub json: bool,
}

/// Evaluate a build file and validate the declared graph.
pub(super) fn load_graph(file: &Path) -> Result<(Manifest, BuildGraph)> {
  if !file.exists() {
    anyhow::bail!("Build file not found: {}", file.display());
  }
  let manifest = evaluate_build_file(file).with_context(|| format!("Failed to evaluate build file: {}", file.display()))?;
  let graph = BuildGraph::from_manifest(&manifest).context("Invalid build graph")?;
  Ok((manifest, graph))
}

pub fn cmd_build(options: BuildOptions) -> Result<ExitCode> {
  let settings = Settings::from_env().context("Invalid environment settings")?;
  let (_, graph) = load_graph(&options.file)?;

  let targets = options
    .targets
    .iter()
    .map(|t| Label::parse(t).with_context(|| format!("Invalid target: {}", t)))
    .collect::<Result<Vec<_>>>()?;

  let out_dir = options
    .out_dir
    .or(settings.out_dir)
    .unwrap_or_else(|| default_out_dir(&options.file));
  let jobs = options.jobs.unwrap_or(settings.jobs);
  let program = match options.evaluator {
    Some(flag) => resolve_program(&flag).context("Invalid --evaluator")?,
    None => settings.evaluator,
  };

  std::fs::create_dir_all(&out_dir)
    .with_context(|| format!("Failed to create output directory: {}", out_dir.display()))?;

  let config = ExecuteConfig::new(&out_dir).with_parallelism(jobs.get());
  let evaluator = Evaluator::system(program);
  debug!(
    out_dir = %out_dir.display(),
    jobs = jobs.get(),
    evaluator = evaluator.program(),
    "resolved build settings"
  );

  let started = Instant::now();
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let report = rt
    .block_on(execute_graph(&graph, &targets, &evaluator, &config))
    .context("Build failed")?;
  let elapsed = started.elapsed();

  if options.json {
    print_report_json(&report)?;
  } else {
    print_report(&report, &out_dir, elapsed);
  }

  Ok(if report.is_success() {
    ExitCode::SUCCESS
  } else {
    ExitCode::FAILURE
  })
}

fn default_out_dir(file: &Path) -> PathBuf {
  file.parent().unwrap_or(Path::new("")).join(DEFAULT_OUT_DIR)
}

fn print_report(report: &BuildReport, out_dir: &Path, elapsed: std::time::Duration) {
  for (label, output) in &report.realized {
    match output {
      TargetOutput::Library(lib) => print_success(&format!(
        "{} {} {} [{}]",
        label,
        symbols::ARROW,
        lib.bundle.display(),
        lib.digest.short(DIGEST_LEN)
      )),
      TargetOutput::Binary(bin) => print_success(&format!(
        "{} {} {} [{}]",
        label,
        symbols::ARROW,
        bin.artifact.display(),
        bin.artifact_digest.short(DIGEST_LEN)
      )),
    }
  }
  for (label, err) in &report.failed {
    print_error(&format!("{}: {}: {}", label, err.kind(), err));
  }
  for (label, cause) in &report.skipped {
    print_warning(&format!("{} skipped: dependency {} did not build", label, cause));
  }

  println!();
  print_info(&format!(
    "Built {} of {} target(s) in {}",
    report.realized.len(),
    report.total(),
    format_duration(elapsed)
  ));
  print_stat("Failed", &report.failed.len().to_string());
  print_stat("Skipped", &report.skipped.len().to_string());
  print_stat("Output", &out_dir.display().to_string());
}

fn print_report_json(report: &BuildReport) -> Result<()> {
  let failed: serde_json::Map<String, serde_json::Value> = report
    .failed
    .iter()
    .map(|(label, err)| {
      (
        label.to_string(),
        json!({ "kind": err.kind(), "message": err.to_string() }),
      )
    })
    .collect();

  print_json(&json!({
    "success": report.is_success(),
    "realized": report.realized,
    "failed": failed,
    "skipped": report.skipped,
  }))
}
