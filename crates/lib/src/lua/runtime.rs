use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use mlua::prelude::*;

use crate::consts::APP_NAME;
use crate::lua::globals;
use crate::manifest::Manifest;

/// Create a Lua runtime with the `cuebuild` global registered.
pub fn create_runtime(manifest: Rc<RefCell<Manifest>>) -> LuaResult<Lua> {
  let lua = Lua::new();
  globals::register_globals(&lua, manifest)?;
  Ok(lua)
}

/// Load and execute a Lua file.
///
/// Sets `cuebuild.dir` to the directory of the loaded file before running it,
/// so relative paths in declarations resolve against that directory.
pub fn load_file(lua: &Lua, path: &Path) -> LuaResult<LuaValue> {
  let canonical_path = dunce::canonicalize(path)
    .map_err(|e| LuaError::external(format!("cannot canonicalize '{}': {}", path.display(), e)))?;
  let content = std::fs::read_to_string(&canonical_path)
    .map_err(|e| LuaError::external(format!("cannot read '{}': {}", canonical_path.display(), e)))?;

  let dir = canonical_path
    .parent()
    .unwrap_or(Path::new(""))
    .to_string_lossy()
    .to_string();
  lua.globals().get::<LuaTable>(APP_NAME)?.set("dir", dir)?;

  lua
    .load(&content)
    .set_name(format!("@{}", canonical_path.display()))
    .eval::<LuaValue>()
}
