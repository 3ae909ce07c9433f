mod build;
mod merge;
mod pack;
mod plan;
mod render;

pub use build::{BuildOptions, cmd_build};
pub use merge::cmd_merge;
pub use pack::cmd_pack;
pub use plan::cmd_plan;
pub use render::cmd_render;
