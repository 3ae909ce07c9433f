//! Implementation of the `cuebuild plan` command.
//!
//! Evaluates a build file and prints its targets grouped into the waves the
//! scheduler would run them in. Nothing is built.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use serde_json::json;

use cuebuild_lib::graph::BuildGraph;
use cuebuild_lib::package::Label;

use super::build::load_graph;
use crate::output::{print_info, print_json, print_stat, symbols};

pub fn cmd_plan(file: &Path, json: bool) -> Result<ExitCode> {
  let (manifest, graph) = load_graph(file)?;
  let waves = graph.waves().context("Failed to order targets")?;

  if json {
    let targets: Vec<_> = waves
      .iter()
      .flatten()
      .map(|label| {
        json!({
          "label": label,
          "kind": graph.kind(label),
          "deps": graph.dependencies(label),
          "dependents": graph.dependents(label),
        })
      })
      .collect();
    print_json(&json!({
      "manifest": manifest,
      "waves": waves,
      "targets": targets,
    }))?;
    return Ok(ExitCode::SUCCESS);
  }

  print_info(&format!("Plan for {}", file.display()));
  print_stat("Libraries", &manifest.libraries.len().to_string());
  print_stat("Binaries", &manifest.binaries.len().to_string());

  for (idx, wave) in waves.iter().enumerate() {
    println!();
    println!("Wave {}:", idx + 1);
    for label in wave {
      println!("  {} {}", symbols::INFO, describe(&graph, label));
    }
  }

  Ok(ExitCode::SUCCESS)
}

fn describe(graph: &BuildGraph, label: &Label) -> String {
  let mut line = if let Some(node) = graph.library(label) {
    format!("{} (library {})", label, node.import_path)
  } else if let Some(target) = graph.binary(label) {
    format!("{} (binary {} {})", label, symbols::ARROW, target.output_name)
  } else {
    label.to_string()
  };

  let deps = graph.dependencies(label);
  if !deps.is_empty() {
    let names: Vec<&str> = deps.iter().map(Label::as_str).collect();
    line.push_str(&format!(" needs {}", names.join(", ")));
  }
  line
}
