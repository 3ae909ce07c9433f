//! Package and target identities.
//!
//! A library target declares a [`PackageNode`]: an import path plus an ordered
//! set of source files. A binary target declares a [`BinaryTarget`]: one entry
//! file rendered against the closure of its dependencies.
//!
//! Both are immutable once declared. The build graph hands them to the
//! scheduler by value, so no target ever observes another target's state.

mod types;

pub use types::*;

pub(crate) use types::file_name;
