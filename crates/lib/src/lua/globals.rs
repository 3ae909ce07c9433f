//! The `cuebuild` global table.
//!
//! - `cuebuild.version` - Version of this crate
//! - `cuebuild.dir` - Directory of the build file being evaluated
//! - `cuebuild.library{}` - Declare a library
//! - `cuebuild.binary{}` - Declare a binary

use std::cell::RefCell;
use std::rc::Rc;

use mlua::prelude::*;

use super::targets::{register_binary, register_library};
use crate::consts::APP_NAME;
use crate::manifest::Manifest;

/// Register the `cuebuild` global table in the Lua runtime.
pub fn register_globals(lua: &Lua, manifest: Rc<RefCell<Manifest>>) -> LuaResult<()> {
  let cuebuild = lua.create_table()?;
  cuebuild.set("version", env!("CARGO_PKG_VERSION"))?;

  register_library(lua, &cuebuild, manifest.clone())?;
  register_binary(lua, &cuebuild, manifest)?;

  lua.globals().set(APP_NAME, cuebuild)?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn cuebuild_global_exists() -> LuaResult<()> {
    let lua = Lua::new();
    register_globals(&lua, Rc::new(RefCell::new(Manifest::default())))?;

    let cuebuild: LuaTable = lua.globals().get("cuebuild")?;
    assert!(cuebuild.contains_key("library")?);
    assert!(cuebuild.contains_key("binary")?);
    assert!(!cuebuild.contains_key("dir")?);

    let version: String = lua.load("return cuebuild.version").eval()?;
    assert_eq!(version, env!("CARGO_PKG_VERSION"));
    Ok(())
  }
}
