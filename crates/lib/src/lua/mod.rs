//! Lua runtime for build files.
//!
//! A build file (`BUILD.lua`) declares targets by calling functions on the
//! `cuebuild` global. Each call records a declaration in a shared [`Manifest`]
//! and returns a target ref that later declarations can list as a dependency.
//!
//! # Submodules
//!
//! - [`globals`] - The `cuebuild` global table
//! - [`runtime`] - Lua VM creation and file loading
//! - [`targets`] - `cuebuild.library{}` and `cuebuild.binary{}`
//!
//! [`Manifest`]: crate::manifest::Manifest

pub mod globals;
pub mod runtime;
pub mod targets;
