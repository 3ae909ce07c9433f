//! Shared utilities.
//!
//! Content hashing for build reports, plus test helpers.

pub mod hash;

#[cfg(test)]
pub mod testutil;
