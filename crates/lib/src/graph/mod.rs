//! Validated target graph.
//!
//! [`BuildGraph::from_manifest`] checks a [`Manifest`] before anything touches
//! the filesystem: labels and import paths must parse, every dependency must
//! name a declared library, import paths must be unique and the dependency
//! edges must be acyclic. The graph then answers ordering questions for the
//! scheduler.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use thiserror::Error;

use crate::manifest::Manifest;
use crate::package::{BinaryTarget, ImportPath, Label, PackageError, PackageNode, file_name};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
  #[error(transparent)]
  Package(#[from] PackageError),

  #[error("target {target} depends on unknown target {dependency}")]
  UnknownDependency { target: Label, dependency: Label },

  #[error("target {target} depends on binary {dependency}; only libraries can be dependencies")]
  BinaryDependency { target: Label, dependency: Label },

  #[error("target {target} lists dependency {dependency} more than once")]
  DuplicateDependency { target: Label, dependency: Label },

  #[error("import path {import_path} is declared by both {first} and {second}")]
  DuplicateImportPath {
    import_path: ImportPath,
    first: Label,
    second: Label,
  },

  #[error("dependency cycle detected involving {0}")]
  CycleDetected(Label),

  #[error("binary {target} has invalid output name '{name}'")]
  InvalidOutputName { target: Label, name: String },

  #[error("binaries {first} and {second} both write output '{name}'")]
  OutputCollision { name: String, first: Label, second: Label },

  #[error("binary {target} entry {} has no usable file name", .path.display())]
  InvalidEntry { target: Label, path: std::path::PathBuf },

  #[error("target {0} is declared more than once")]
  DuplicateLabel(Label),

  #[error("unknown target {0}")]
  UnknownTarget(Label),
}

/// Which kind of declaration a label refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
  Library,
  Binary,
}

impl fmt::Display for TargetKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TargetKind::Library => write!(f, "library"),
      TargetKind::Binary => write!(f, "binary"),
    }
  }
}

/// Libraries and binaries with their dependency edges.
///
/// Edges point from dependency to dependent.
#[derive(Debug)]
pub struct BuildGraph {
  graph: DiGraph<Label, ()>,
  nodes: HashMap<Label, NodeIndex>,
  libraries: BTreeMap<Label, PackageNode>,
  binaries: BTreeMap<Label, BinaryTarget>,
  /// Direct dependencies in declaration order.
  deps: BTreeMap<Label, Vec<Label>>,
}

impl BuildGraph {
  pub fn from_manifest(manifest: &Manifest) -> Result<Self, GraphError> {
    let mut graph = DiGraph::new();
    let mut nodes = HashMap::new();
    let mut libraries = BTreeMap::new();
    let mut binaries = BTreeMap::new();
    let mut deps = BTreeMap::new();

    let mut owners: HashMap<ImportPath, Label> = HashMap::new();
    for (label, decl) in &manifest.libraries {
      let label = Label::parse(label.as_str())?;
      let import_path = ImportPath::parse(&decl.import_path)?;
      if let Some(first) = owners.get(&import_path) {
        return Err(GraphError::DuplicateImportPath {
          import_path,
          first: first.clone(),
          second: label,
        });
      }
      owners.insert(import_path.clone(), label.clone());

      let node = PackageNode::new(label.clone(), import_path, decl.srcs.clone())?;
      nodes.insert(label.clone(), graph.add_node(label.clone()));
      deps.insert(label.clone(), decl.deps.clone());
      libraries.insert(label, node);
    }

    let mut outputs: HashMap<String, Label> = HashMap::new();
    for (label, decl) in &manifest.binaries {
      let label = Label::parse(label.as_str())?;
      if nodes.contains_key(&label) {
        return Err(GraphError::DuplicateLabel(label));
      }
      if file_name(&decl.src).is_none() {
        return Err(GraphError::InvalidEntry {
          target: label,
          path: decl.src.clone(),
        });
      }

      let output_name = decl
        .output_name
        .clone()
        .unwrap_or_else(|| BinaryTarget::default_output_name(&label, decl.output_format));
      validate_output_name(&label, &output_name)?;
      if let Some(first) = outputs.get(&output_name) {
        return Err(GraphError::OutputCollision {
          name: output_name,
          first: first.clone(),
          second: label,
        });
      }
      outputs.insert(output_name.clone(), label.clone());

      let target = BinaryTarget {
        label: label.clone(),
        entry: decl.src.clone(),
        output_format: decl.output_format,
        escape: decl.escape,
        output_name,
      };
      nodes.insert(label.clone(), graph.add_node(label.clone()));
      deps.insert(label.clone(), decl.deps.clone());
      binaries.insert(label, target);
    }

    for (label, dep_list) in &deps {
      let mut seen = HashSet::new();
      for dep in dep_list {
        if !seen.insert(dep) {
          return Err(GraphError::DuplicateDependency {
            target: label.clone(),
            dependency: dep.clone(),
          });
        }
        if binaries.contains_key(dep) {
          return Err(GraphError::BinaryDependency {
            target: label.clone(),
            dependency: dep.clone(),
          });
        }
        let Some(&dep_idx) = nodes.get(dep) else {
          return Err(GraphError::UnknownDependency {
            target: label.clone(),
            dependency: dep.clone(),
          });
        };
        graph.add_edge(dep_idx, nodes[label], ());
      }
    }

    let built = Self {
      graph,
      nodes,
      libraries,
      binaries,
      deps,
    };
    built.verify_acyclic()?;
    Ok(built)
  }

  fn verify_acyclic(&self) -> Result<(), GraphError> {
    toposort(&self.graph, None).map_err(|cycle| GraphError::CycleDetected(self.graph[cycle.node_id()].clone()))?;
    Ok(())
  }

  /// All targets with dependencies before dependents.
  pub fn topological_order(&self) -> Result<Vec<Label>, GraphError> {
    let sorted =
      toposort(&self.graph, None).map_err(|cycle| GraphError::CycleDetected(self.graph[cycle.node_id()].clone()))?;
    Ok(sorted.into_iter().map(|idx| self.graph[idx].clone()).collect())
  }

  /// Targets grouped into waves; every dependency of a wave member lives in an
  /// earlier wave. Members of a wave are sorted by label.
  pub fn waves(&self) -> Result<Vec<Vec<Label>>, GraphError> {
    let mut in_degree: HashMap<NodeIndex, usize> = self
      .graph
      .node_indices()
      .map(|idx| (idx, self.graph.neighbors_directed(idx, Direction::Incoming).count()))
      .collect();
    let mut remaining: HashSet<NodeIndex> = self.graph.node_indices().collect();
    let mut waves = Vec::new();

    while !remaining.is_empty() {
      let mut ready: Vec<NodeIndex> = remaining.iter().filter(|idx| in_degree[*idx] == 0).copied().collect();

      if ready.is_empty() {
        let Some(stuck) = remaining.iter().map(|idx| &self.graph[*idx]).min() else {
          break;
        };
        return Err(GraphError::CycleDetected(stuck.clone()));
      }

      for idx in &ready {
        remaining.remove(idx);
        for dependent in self.graph.neighbors_directed(*idx, Direction::Outgoing) {
          if let Some(deg) = in_degree.get_mut(&dependent) {
            *deg = deg.saturating_sub(1);
          }
        }
      }

      ready.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));
      waves.push(ready.into_iter().map(|idx| self.graph[idx].clone()).collect());
    }

    Ok(waves)
  }

  /// Direct dependencies of a target in declaration order.
  pub fn dependencies(&self, label: &Label) -> &[Label] {
    self.deps.get(label).map(Vec::as_slice).unwrap_or(&[])
  }

  /// Targets that list `label` as a direct dependency, sorted.
  pub fn dependents(&self, label: &Label) -> Vec<Label> {
    let Some(&idx) = self.nodes.get(label) else {
      return Vec::new();
    };
    let mut dependents: Vec<Label> = self
      .graph
      .neighbors_directed(idx, Direction::Outgoing)
      .map(|d| self.graph[d].clone())
      .collect();
    dependents.sort();
    dependents
  }

  /// The named targets plus everything they transitively depend on.
  pub fn required_by<'a>(&self, roots: impl IntoIterator<Item = &'a Label>) -> Result<BTreeSet<Label>, GraphError> {
    let mut required = BTreeSet::new();
    let mut stack = Vec::new();
    for root in roots {
      if !self.nodes.contains_key(root) {
        return Err(GraphError::UnknownTarget(root.clone()));
      }
      stack.push(root.clone());
    }

    while let Some(label) = stack.pop() {
      if !required.insert(label.clone()) {
        continue;
      }
      stack.extend(self.dependencies(&label).iter().cloned());
    }
    Ok(required)
  }

  pub fn kind(&self, label: &Label) -> Option<TargetKind> {
    if self.libraries.contains_key(label) {
      Some(TargetKind::Library)
    } else if self.binaries.contains_key(label) {
      Some(TargetKind::Binary)
    } else {
      None
    }
  }

  pub fn library(&self, label: &Label) -> Option<&PackageNode> {
    self.libraries.get(label)
  }

  pub fn binary(&self, label: &Label) -> Option<&BinaryTarget> {
    self.binaries.get(label)
  }

  pub fn libraries(&self) -> impl Iterator<Item = &PackageNode> {
    self.libraries.values()
  }

  pub fn binaries(&self) -> impl Iterator<Item = &BinaryTarget> {
    self.binaries.values()
  }

  pub fn target_count(&self) -> usize {
    self.nodes.len()
  }
}

fn validate_output_name(target: &Label, name: &str) -> Result<(), GraphError> {
  let invalid = name.is_empty()
    || name == "."
    || name == ".."
    || name.contains('/')
    || name.contains('\\')
    || name.ends_with(".pkg.zip")
    || name.ends_with(".merged.zip");
  if invalid {
    return Err(GraphError::InvalidOutputName {
      target: target.clone(),
      name: name.to_string(),
    });
  }
  Ok(())
}
