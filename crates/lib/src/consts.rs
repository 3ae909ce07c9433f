//! Crate-wide constants.

pub const APP_NAME: &str = "cuebuild";

/// Default build file name looked up by the CLI.
pub const BUILD_FILE_NAME: &str = "BUILD.lua";

/// Directory inside a bundle under which library packages are placed.
pub const PKG_ROOT: &str = "cue.mod/pkg";

/// Default evaluator program.
pub const DEFAULT_EVALUATOR: &str = "cue";

/// Default output directory name, created next to the build file.
pub const DEFAULT_OUT_DIR: &str = "cuebuild-out";

/// Value is 315532800 = January 1, 1980 00:00:00 UTC (ZIP epoch)
pub const SOURCE_DATE_EPOCH: &str = "315532800";

pub const ENV_OUT_DIR: &str = "CUEBUILD_OUT_DIR";
pub const ENV_EVALUATOR: &str = "CUEBUILD_EVALUATOR";
pub const ENV_JOBS: &str = "CUEBUILD_JOBS";

/// Metatable `__type` marker for target refs returned to Lua.
pub const TARGET_REF_TYPE: &str = "cuebuild.target";
