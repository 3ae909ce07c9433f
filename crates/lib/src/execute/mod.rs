//! Target execution.
//!
//! This module realizes a validated [`BuildGraph`]. It handles:
//! - Wave-based dependency ordering
//! - Parallel execution of independent targets
//! - Failure propagation and skip tracking
//!
//! Each realized target returns its [`Closure`]; the scheduler keeps those
//! values and passes them to dependents explicitly.

pub mod target;
pub mod types;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::closure::Closure;
use crate::graph::BuildGraph;
use crate::package::{BinaryTarget, Label, PackageNode};
use crate::process::ProcessRunner;
use crate::render::Evaluator;

pub use target::{realize_binary, realize_library};
pub use types::{BinaryOutput, BuildReport, ErrorKind, ExecuteConfig, ExecuteError, LibraryOutput, TargetOutput};

/// Work item handed to a task. Owns everything it needs.
enum Job {
  Library(PackageNode),
  Binary(BinaryTarget),
}

/// Realize targets of a graph.
///
/// With an empty `targets` slice every target is realized; otherwise only the
/// named targets and their transitive dependencies. Targets run wave by wave,
/// with up to `config.parallelism` targets of a wave in flight. A failed
/// target's dependents are skipped; unrelated targets still run.
pub async fn execute_graph<R>(
  graph: &BuildGraph,
  targets: &[Label],
  evaluator: &Evaluator<R>,
  config: &ExecuteConfig,
) -> Result<BuildReport, ExecuteError>
where
  R: ProcessRunner + 'static,
{
  let selected: Option<BTreeSet<Label>> = if targets.is_empty() {
    None
  } else {
    Some(graph.required_by(targets)?)
  };

  let waves: Vec<Vec<Label>> = graph
    .waves()?
    .into_iter()
    .map(|wave| {
      wave
        .into_iter()
        .filter(|label| selected.as_ref().is_none_or(|s| s.contains(label)))
        .collect::<Vec<_>>()
    })
    .filter(|wave| !wave.is_empty())
    .collect();

  info!(
    targets = waves.iter().map(Vec::len).sum::<usize>(),
    waves = waves.len(),
    out_dir = %config.out_dir.display(),
    "starting build"
  );

  let mut report = BuildReport::default();
  let mut closures: HashMap<Label, Closure> = HashMap::new();
  let semaphore = Arc::new(Semaphore::new(config.parallelism.max(1)));

  for (wave_idx, wave) in waves.iter().enumerate() {
    debug!(wave = wave_idx, targets = wave.len(), "executing wave");

    let mut ready = Vec::new();
    for label in wave {
      let blocked = graph
        .dependencies(label)
        .iter()
        .find(|dep| report.failed.contains_key(*dep) || report.skipped.contains_key(*dep));

      if let Some(dep) = blocked {
        warn!(target = %label, failed_dep = %dep, "skipping target due to failed dependency");
        report.skipped.insert(label.clone(), dep.clone());
      } else {
        ready.push(label.clone());
      }
    }

    if ready.is_empty() {
      continue;
    }

    let results = execute_wave(&ready, graph, &closures, evaluator, config, semaphore.clone()).await;
    for (label, result) in results {
      match result {
        Ok(output) => {
          info!(target = %label, "target realized");
          closures.insert(label.clone(), output.closure().clone());
          report.realized.insert(label, output);
        }
        Err(e) => {
          error!(target = %label, error = %e, kind = %e.kind(), "target failed");
          report.failed.insert(label, e);
        }
      }
    }
  }

  info!(
    realized = report.realized.len(),
    failed = report.failed.len(),
    skipped = report.skipped.len(),
    "build complete"
  );

  Ok(report)
}

/// Run one wave's ready targets concurrently.
async fn execute_wave<R>(
  ready: &[Label],
  graph: &BuildGraph,
  closures: &HashMap<Label, Closure>,
  evaluator: &Evaluator<R>,
  config: &ExecuteConfig,
  semaphore: Arc<Semaphore>,
) -> Vec<(Label, Result<TargetOutput, ExecuteError>)>
where
  R: ProcessRunner + 'static,
{
  let mut results = Vec::with_capacity(ready.len());
  let mut spawned = Vec::with_capacity(ready.len());
  let mut join_set = JoinSet::new();

  for label in ready {
    let job = match (graph.library(label), graph.binary(label)) {
      (Some(node), _) => Job::Library(node.clone()),
      (None, Some(target)) => Job::Binary(target.clone()),
      (None, None) => {
        results.push((label.clone(), Err(ExecuteError::TargetNotFound(label.clone()))));
        continue;
      }
    };

    let dep_closures = match dependency_closures(label, graph, closures) {
      Ok(deps) => deps,
      Err(e) => {
        results.push((label.clone(), Err(e)));
        continue;
      }
    };

    let label = label.clone();
    let evaluator = evaluator.clone();
    let config = config.clone();
    let semaphore = semaphore.clone();
    spawned.push(label.clone());

    join_set.spawn(async move {
      // Acquire semaphore permit inside the task
      let _permit = semaphore.acquire().await.ok();
      let deps: Vec<&Closure> = dep_closures.iter().collect();

      let result = match job {
        Job::Library(node) => realize_library(&node, &deps, &config)
          .await
          .map(TargetOutput::Library),
        Job::Binary(target) => realize_binary(&target, &deps, &evaluator, &config)
          .await
          .map(TargetOutput::Binary),
      };
      (label, result)
    });
  }

  let mut panics = Vec::new();
  while let Some(joined) = join_set.join_next().await {
    match joined {
      Ok(done) => results.push(done),
      Err(e) => {
        error!(error = %e, "target task panicked");
        panics.push(e.to_string());
      }
    }
  }

  // A panicked task never reports its label; attribute the panic to every
  // spawned target that produced no result.
  if !panics.is_empty() {
    let message = panics.join("; ");
    for label in spawned {
      if !results.iter().any(|(done, _)| *done == label) {
        results.push((
          label.clone(),
          Err(ExecuteError::TaskPanicked {
            target: label,
            message: message.clone(),
          }),
        ));
      }
    }
  }

  results
}

/// Owned closures of a target's direct dependencies, in declaration order.
fn dependency_closures(
  label: &Label,
  graph: &BuildGraph,
  closures: &HashMap<Label, Closure>,
) -> Result<Vec<Closure>, ExecuteError> {
  graph
    .dependencies(label)
    .iter()
    .map(|dep| {
      closures.get(dep).cloned().ok_or_else(|| ExecuteError::MissingClosure {
        target: label.clone(),
        dependency: dep.clone(),
      })
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use std::path::{Path, PathBuf};

  use super::*;
  use crate::graph::GraphError;
  use crate::manifest::{BinaryDecl, LibraryDecl, Manifest};
  use crate::package::OutputFormat;
  use crate::process::ProcessOutput;
  use crate::util::testutil::{MockRunner, write_file};
  use tempfile::TempDir;

  fn label(s: &str) -> Label {
    Label(s.to_string())
  }

  /// Declares library `name` with one source file `<name>/<file>`.
  fn add_lib(manifest: &mut Manifest, dir: &Path, name: &str, file: &str, content: &str, deps: &[&str]) {
    let src = write_file(dir, &format!("{}/{}", name, file), content);
    manifest.libraries.insert(
      label(name),
      LibraryDecl {
        import_path: format!("example.com/{}", name),
        srcs: vec![src],
        deps: deps.iter().map(|d| label(d)).collect(),
      },
    );
  }

  fn add_bin(manifest: &mut Manifest, name: &str, src: PathBuf, deps: &[&str]) {
    manifest.binaries.insert(
      label(name),
      BinaryDecl {
        src,
        deps: deps.iter().map(|d| label(d)).collect(),
        output_format: OutputFormat::Json,
        escape: false,
        output_name: None,
      },
    );
  }

  async fn run(manifest: &Manifest, out: &Path, runner: MockRunner) -> BuildReport {
    let graph = BuildGraph::from_manifest(manifest).unwrap();
    let evaluator = Evaluator::new("cue", runner);
    execute_graph(&graph, &[], &evaluator, &ExecuteConfig::new(out).with_parallelism(2))
      .await
      .unwrap()
  }

  fn artifact(report: &BuildReport, name: &str) -> Vec<u8> {
    match &report.realized[&label(name)] {
      TargetOutput::Binary(out) => std::fs::read(&out.artifact).unwrap(),
      TargetOutput::Library(_) => panic!("{name} is a library"),
    }
  }

  #[tokio::test]
  async fn diamond_includes_shared_dependency_once() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let mut manifest = Manifest::default();
    add_lib(&mut manifest, src.path(), "d", "d.cue", "d: 1\n", &[]);
    add_lib(&mut manifest, src.path(), "b", "b.cue", "b: 1\n", &["d"]);
    add_lib(&mut manifest, src.path(), "c", "c.cue", "c: 1\n", &["d"]);
    let main = write_file(src.path(), "main.cue", "a: 1\n");
    add_bin(&mut manifest, "a", main, &["b", "c"]);

    let report = run(&manifest, out.path(), MockRunner::concatenating()).await;

    assert!(report.is_success());
    assert_eq!(report.realized.len(), 4);
    let closure: Vec<_> = report.realized[&label("a")].closure().labels().map(Label::as_str).collect();
    assert_eq!(closure, vec!["d", "b", "c"]);
  }

  #[tokio::test]
  async fn merged_bundle_holds_closure_and_entry() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let mut manifest = Manifest::default();
    add_lib(&mut manifest, src.path(), "lib", "lib.cue", "v: 1\n", &[]);
    let main = write_file(src.path(), "app/main.cue", "x: 2\n");
    add_bin(&mut manifest, "app", main, &["lib"]);

    let report = run(&manifest, out.path(), MockRunner::concatenating()).await;

    let TargetOutput::Binary(app) = &report.realized[&label("app")] else {
      panic!("app is a binary");
    };
    let merged = crate::archive::Bundle::read_from(&app.merged).unwrap();
    assert_eq!(
      merged.paths().collect::<Vec<_>>(),
      vec!["cue.mod/pkg/example.com/lib/lib.cue", "main.cue"]
    );
    let text = String::from_utf8(artifact(&report, "app")).unwrap();
    assert_eq!(text, "cue.mod/pkg/example.com/lib/lib.cue:\nv: 1\nmain.cue:\nx: 2\n");
  }

  #[tokio::test]
  async fn repeated_builds_are_byte_identical() {
    let src = TempDir::new().unwrap();
    let mut manifest = Manifest::default();
    add_lib(&mut manifest, src.path(), "lib", "lib.src", "value: 1\n", &[]);
    let main = write_file(src.path(), "main.src", "out: value\n");
    add_bin(&mut manifest, "app", main.clone(), &["lib"]);

    let first_out = TempDir::new().unwrap();
    let second_out = TempDir::new().unwrap();
    let first = run(&manifest, first_out.path(), MockRunner::concatenating()).await;
    std::thread::sleep(std::time::Duration::from_millis(1100));
    let second = run(&manifest, second_out.path(), MockRunner::concatenating()).await;

    assert_eq!(artifact(&first, "app"), artifact(&second, "app"));
    let merged = |r: &BuildReport| match &r.realized[&label("app")] {
      TargetOutput::Binary(b) => b.merged_digest.clone(),
      TargetOutput::Library(_) => unreachable!(),
    };
    assert_eq!(merged(&first), merged(&second));

    // Changing the entry changes the artifact.
    std::fs::write(&main, "out: value + 1\n").unwrap();
    let third_out = TempDir::new().unwrap();
    let third = run(&manifest, third_out.path(), MockRunner::concatenating()).await;
    assert_ne!(artifact(&first, "app"), artifact(&third, "app"));
  }

  #[tokio::test]
  async fn sibling_order_does_not_change_merged_bundle() {
    let src = TempDir::new().unwrap();
    let main = write_file(src.path(), "main.cue", "m: 1\n");

    let build = |order: [&'static str; 2]| {
      let mut manifest = Manifest::default();
      add_lib(&mut manifest, src.path(), "left", "l.cue", "l: 1\n", &[]);
      add_lib(&mut manifest, src.path(), "right", "r.cue", "r: 1\n", &[]);
      add_bin(&mut manifest, "app", main.clone(), &order);
      manifest
    };

    let one_out = TempDir::new().unwrap();
    let two_out = TempDir::new().unwrap();
    let one = run(&build(["left", "right"]), one_out.path(), MockRunner::succeeding("{}")).await;
    let two = run(&build(["right", "left"]), two_out.path(), MockRunner::succeeding("{}")).await;

    let digest = |r: &BuildReport| match &r.realized[&label("app")] {
      TargetOutput::Binary(b) => b.merged_digest.clone(),
      TargetOutput::Library(_) => unreachable!(),
    };
    assert_eq!(digest(&one), digest(&two));
  }

  #[tokio::test]
  async fn failure_skips_dependents_only() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let mut manifest = Manifest::default();
    add_lib(&mut manifest, src.path(), "broken", "broken.cue", "x: 1\n", &[]);
    add_lib(&mut manifest, src.path(), "mid", "mid.cue", "m: 1\n", &["broken"]);
    add_lib(&mut manifest, src.path(), "fine", "fine.cue", "f: 1\n", &[]);
    let main = write_file(src.path(), "main.cue", "a: 1\n");
    add_bin(&mut manifest, "app", main, &["mid"]);
    std::fs::remove_file(src.path().join("broken/broken.cue")).unwrap();

    let report = run(&manifest, out.path(), MockRunner::succeeding("{}")).await;

    assert!(!report.is_success());
    assert_eq!(report.failed[&label("broken")].kind(), ErrorKind::Io);
    assert_eq!(report.skipped[&label("mid")], label("broken"));
    assert_eq!(report.skipped[&label("app")], label("mid"));
    assert!(report.realized.contains_key(&label("fine")));
    assert_eq!(report.total(), 4);
  }

  #[tokio::test]
  async fn evaluator_failure_is_external_tool_error() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let mut manifest = Manifest::default();
    let main = write_file(src.path(), "main.cue", "a: \n");
    add_bin(&mut manifest, "app", main, &[]);

    let runner = MockRunner::new(|_| {
      Ok(ProcessOutput {
        code: Some(1),
        stdout: Vec::new(),
        stderr: b"expected operand\n".to_vec(),
      })
    });
    let report = run(&manifest, out.path(), runner).await;

    let err = &report.failed[&label("app")];
    assert_eq!(err.kind(), ErrorKind::ExternalTool);
    assert!(err.to_string().contains("expected operand"));
    assert!(!out.path().join("app.json").exists());
  }

  #[tokio::test]
  async fn selected_targets_limit_execution() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let mut manifest = Manifest::default();
    add_lib(&mut manifest, src.path(), "base", "base.cue", "b: 1\n", &[]);
    add_lib(&mut manifest, src.path(), "other", "other.cue", "o: 1\n", &[]);
    let main = write_file(src.path(), "main.cue", "a: 1\n");
    add_bin(&mut manifest, "app", main, &["base"]);

    let graph = BuildGraph::from_manifest(&manifest).unwrap();
    let evaluator = Evaluator::new("cue", MockRunner::succeeding("{}"));
    let config = ExecuteConfig::new(out.path());
    let report = execute_graph(&graph, &[label("app")], &evaluator, &config).await.unwrap();

    assert_eq!(
      report.realized.keys().cloned().collect::<Vec<_>>(),
      vec![label("app"), label("base")]
    );
    assert!(!config.library_bundle(&label("other")).exists());

    let err = execute_graph(&graph, &[label("nope")], &evaluator, &config)
      .await
      .unwrap_err();
    assert!(matches!(err, ExecuteError::Graph(GraphError::UnknownTarget(_))));
  }

  #[tokio::test]
  async fn evaluator_sees_each_binary_once() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let mut manifest = Manifest::default();
    add_lib(&mut manifest, src.path(), "lib", "lib.cue", "v: 1\n", &[]);
    let one = write_file(src.path(), "one/main.cue", "a: 1\n");
    let two = write_file(src.path(), "two/main.cue", "b: 1\n");
    add_bin(&mut manifest, "one", one, &["lib"]);
    add_bin(&mut manifest, "two", two, &["lib"]);

    let runner = MockRunner::succeeding("{}");
    let report = run(&manifest, out.path(), runner.clone()).await;

    assert!(report.is_success());
    assert_eq!(runner.calls().len(), 2);
    assert!(out.path().join("one.json").exists());
    assert!(out.path().join("two.json").exists());
  }
}
