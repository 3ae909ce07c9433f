//! cuebuild-lib: Core types and logic for cuebuild
//!
//! This crate assembles CUE sources and their transitive dependencies into
//! self-contained bundles and renders them with an external evaluator:
//! - `PackageNode`: a library's import path and ordered sources
//! - `Bundle`: reproducible zip archive of one node's sources
//! - `Closure`: ordered, deduplicated bundles of a node and its dependencies
//! - `BuildGraph`: validated targets declared by a `BUILD.lua` file
//! - `Evaluator`: runs `cue export` against a merged bundle

pub mod archive;
pub mod closure;
pub mod config;
pub mod consts;
pub mod eval;
pub mod execute;
pub mod graph;
pub mod lua;
pub mod manifest;
pub mod package;
pub mod process;
pub mod render;
pub mod util;
