//! Bundles: packaging, encoding and merging of source files.
//!
//! A [`Bundle`] is an ordered list of `(relative path, content)` entries. On
//! disk it is a zip archive written with fixed metadata, so its bytes depend
//! only on entry paths and contents.
//!
//! # Submodules
//!
//! - [`bundle`] - The `Bundle` type and its zip encoding
//! - [`builder`] - Packaging a package's or entry file's sources into a bundle
//! - [`merge`] - Last-write-wins merging of an ordered bundle sequence

pub mod builder;
pub mod bundle;
pub mod merge;

pub use builder::{BuilderError, PackManifest, build_entry_bundle, build_package_bundle, package_entry_path};
pub use bundle::{Bundle, BundleEntry, BundleError};
pub use merge::{merge_bundles, merge_files};
