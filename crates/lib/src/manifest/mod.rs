//! Target manifest types.
//!
//! Manifests are the evaluated result of a Lua build file, containing every
//! declared library and binary target ready for graph validation.

mod types;

pub use types::*;
