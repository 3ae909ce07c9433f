//! Lua bindings for `cuebuild.library{}` and `cuebuild.binary{}`.
//!
//! Both functions validate their spec table, record a declaration in the
//! manifest and return a target ref:
//!
//! ```lua
//! { name = "schema", kind = "library" }  -- metatable { __type = "cuebuild.target" }
//! ```
//!
//! Dependencies may be given as refs or as label strings. String labels can
//! refer to targets declared later in the file; the build graph checks them.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use mlua::prelude::*;

use crate::consts::{APP_NAME, TARGET_REF_TYPE};
use crate::manifest::{BinaryDecl, LibraryDecl, Manifest};
use crate::package::{ImportPath, Label, OutputFormat};

/// Register `cuebuild.library` on the given table.
pub fn register_library(lua: &Lua, table: &LuaTable, manifest: Rc<RefCell<Manifest>>) -> LuaResult<()> {
  let library_fn = lua.create_function(move |lua, spec: LuaTable| {
    let label = parse_label(&spec)?;
    ensure_undeclared(&manifest.borrow(), &label)?;

    let import_path: String = spec
      .get::<Option<String>>("import_path")?
      .ok_or_else(|| LuaError::external(format!("library '{}' requires 'import_path' field", label)))?;
    ImportPath::parse(&import_path).map_err(LuaError::external)?;

    let base = base_dir(lua)?;
    let srcs_table: LuaTable = spec
      .get::<Option<LuaTable>>("srcs")?
      .ok_or_else(|| LuaError::external(format!("library '{}' requires 'srcs' field", label)))?;
    let srcs = parse_paths(&srcs_table, &base, &label)?;
    let deps = parse_deps(spec.get("deps")?, &label)?;

    manifest.borrow_mut().libraries.insert(
      label.clone(),
      LibraryDecl {
        import_path,
        srcs,
        deps,
      },
    );

    target_ref(lua, &label, "library")
  })?;

  table.set("library", library_fn)?;
  Ok(())
}

/// Register `cuebuild.binary` on the given table.
pub fn register_binary(lua: &Lua, table: &LuaTable, manifest: Rc<RefCell<Manifest>>) -> LuaResult<()> {
  let binary_fn = lua.create_function(move |lua, spec: LuaTable| {
    let label = parse_label(&spec)?;
    ensure_undeclared(&manifest.borrow(), &label)?;

    let src: String = spec
      .get::<Option<String>>("src")?
      .ok_or_else(|| LuaError::external(format!("binary '{}' requires 'src' field", label)))?;
    let src = resolve_path(&base_dir(lua)?, &src);

    let output_format = match spec.get::<Option<String>>("output_format")? {
      Some(s) => s.parse::<OutputFormat>().map_err(LuaError::external)?,
      None => OutputFormat::default(),
    };
    let escape = spec.get::<Option<bool>>("escape")?.unwrap_or(false);
    let output_name = spec.get::<Option<String>>("output_name")?;
    let deps = parse_deps(spec.get("deps")?, &label)?;

    manifest.borrow_mut().binaries.insert(
      label.clone(),
      BinaryDecl {
        src,
        deps,
        output_format,
        escape,
        output_name,
      },
    );

    target_ref(lua, &label, "binary")
  })?;

  table.set("binary", binary_fn)?;
  Ok(())
}

fn parse_label(spec: &LuaTable) -> LuaResult<Label> {
  let name: String = spec
    .get::<Option<String>>("name")?
    .ok_or_else(|| LuaError::external("target spec requires 'name' field"))?;
  Label::parse(&name).map_err(LuaError::external)
}

fn ensure_undeclared(manifest: &Manifest, label: &Label) -> LuaResult<()> {
  if manifest.contains(label) {
    return Err(LuaError::external(format!("target '{}' is already declared", label)));
  }
  Ok(())
}

/// Directory relative paths resolve against: `cuebuild.dir`, or the current
/// directory when no file is being loaded.
fn base_dir(lua: &Lua) -> LuaResult<PathBuf> {
  let dir: Option<String> = lua.globals().get::<LuaTable>(APP_NAME)?.get("dir")?;
  match dir {
    Some(dir) => Ok(PathBuf::from(dir)),
    None => std::env::current_dir().map_err(LuaError::external),
  }
}

fn resolve_path(base: &Path, value: &str) -> PathBuf {
  let path = Path::new(value);
  if path.is_absolute() { path.to_path_buf() } else { base.join(path) }
}

fn parse_paths(table: &LuaTable, base: &Path, label: &Label) -> LuaResult<Vec<PathBuf>> {
  let mut paths = Vec::with_capacity(table.raw_len());
  for value in table.sequence_values::<LuaValue>() {
    match value? {
      LuaValue::String(s) => paths.push(resolve_path(base, &s.to_str()?)),
      other => {
        return Err(LuaError::external(format!(
          "target '{}': srcs entries must be strings, got {}",
          label,
          other.type_name()
        )));
      }
    }
  }
  Ok(paths)
}

fn parse_deps(value: Option<LuaValue>, label: &Label) -> LuaResult<Vec<Label>> {
  let table = match value {
    None | Some(LuaValue::Nil) => return Ok(Vec::new()),
    Some(LuaValue::Table(t)) => t,
    Some(other) => {
      return Err(LuaError::external(format!(
        "target '{}': deps must be a list, got {}",
        label,
        other.type_name()
      )));
    }
  };

  let mut deps = Vec::with_capacity(table.raw_len());
  for value in table.sequence_values::<LuaValue>() {
    let dep = match value? {
      LuaValue::String(s) => Label::parse(&s.to_str()?).map_err(LuaError::external)?,
      LuaValue::Table(t) if is_target_ref(&t) => {
        let name: String = t.get("name")?;
        Label::parse(&name).map_err(LuaError::external)?
      }
      other => {
        return Err(LuaError::external(format!(
          "target '{}': deps entries must be labels or target refs, got {}",
          label,
          other.type_name()
        )));
      }
    };
    deps.push(dep);
  }
  Ok(deps)
}

fn is_target_ref(table: &LuaTable) -> bool {
  table
    .metatable()
    .and_then(|mt| mt.get::<String>("__type").ok())
    .is_some_and(|t| t == TARGET_REF_TYPE)
}

fn target_ref(lua: &Lua, label: &Label, kind: &str) -> LuaResult<LuaTable> {
  let ref_table = lua.create_table()?;
  ref_table.set("name", label.as_str())?;
  ref_table.set("kind", kind)?;

  // Set metatable with __type marker
  let mt = lua.create_table()?;
  mt.set("__type", TARGET_REF_TYPE)?;
  ref_table.set_metatable(Some(mt))?;

  Ok(ref_table)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::lua::globals::register_globals;

  fn create_test_lua_with_manifest() -> LuaResult<(Lua, Rc<RefCell<Manifest>>)> {
    let lua = Lua::new();
    let manifest = Rc::new(RefCell::new(Manifest::default()));
    register_globals(&lua, manifest.clone())?;
    lua.load(r#"cuebuild.dir = "/project""#).exec()?;
    Ok((lua, manifest))
  }

  fn label(s: &str) -> Label {
    Label(s.to_string())
  }

  mod library {
    use super::*;

    #[test]
    fn returns_target_ref() -> LuaResult<()> {
      let (lua, manifest) = create_test_lua_with_manifest()?;

      let result: LuaTable = lua
        .load(
          r#"
            return cuebuild.library({
              name = "schema",
              import_path = "example.com/schema",
              srcs = { "schema/defs.cue", "/abs/types.cue" },
            })
          "#,
        )
        .eval()?;

      assert_eq!(result.get::<String>("name")?, "schema");
      assert_eq!(result.get::<String>("kind")?, "library");
      let mt = result.metatable().expect("should have metatable");
      assert_eq!(mt.get::<String>("__type")?, TARGET_REF_TYPE);

      let manifest = manifest.borrow();
      let decl = &manifest.libraries[&label("schema")];
      assert_eq!(decl.import_path, "example.com/schema");
      assert_eq!(
        decl.srcs,
        vec![PathBuf::from("/project/schema/defs.cue"), PathBuf::from("/abs/types.cue")]
      );
      assert!(decl.deps.is_empty());
      Ok(())
    }

    #[test]
    fn deps_accept_refs_and_labels_in_order() -> LuaResult<()> {
      let (lua, manifest) = create_test_lua_with_manifest()?;

      lua
        .load(
          r#"
            local a = cuebuild.library({ name = "a", import_path = "x/a", srcs = { "a.cue" } })
            cuebuild.library({ name = "top", import_path = "x/top", srcs = { "t.cue" }, deps = { "later", a } })
          "#,
        )
        .exec()?;

      let manifest = manifest.borrow();
      assert_eq!(manifest.libraries[&label("top")].deps, vec![label("later"), label("a")]);
      Ok(())
    }

    #[test]
    fn missing_import_path_is_error() {
      let (lua, _) = create_test_lua_with_manifest().unwrap();
      let err = lua
        .load(r#"cuebuild.library({ name = "a", srcs = { "a.cue" } })"#)
        .exec()
        .unwrap_err();
      assert!(err.to_string().contains("requires 'import_path'"));
    }

    #[test]
    fn invalid_import_path_is_error() {
      let (lua, _) = create_test_lua_with_manifest().unwrap();
      let err = lua
        .load(r#"cuebuild.library({ name = "a", import_path = "../a", srcs = { "a.cue" } })"#)
        .exec()
        .unwrap_err();
      assert!(err.to_string().contains("invalid import path"));
    }

    #[test]
    fn non_string_source_is_error() {
      let (lua, _) = create_test_lua_with_manifest().unwrap();
      let err = lua
        .load(r#"cuebuild.library({ name = "a", import_path = "x/a", srcs = { 42 } })"#)
        .exec()
        .unwrap_err();
      assert!(err.to_string().contains("srcs entries must be strings"));
    }

    #[test]
    fn plain_table_is_not_a_dependency() {
      let (lua, _) = create_test_lua_with_manifest().unwrap();
      let err = lua
        .load(r#"cuebuild.library({ name = "a", import_path = "x/a", srcs = { "a.cue" }, deps = { { name = "b" } } })"#)
        .exec()
        .unwrap_err();
      assert!(err.to_string().contains("labels or target refs"));
    }
  }

  mod binary {
    use super::*;

    #[test]
    fn records_declaration_with_defaults() -> LuaResult<()> {
      let (lua, manifest) = create_test_lua_with_manifest()?;

      let result: LuaTable = lua
        .load(r#"return cuebuild.binary({ name = "cfg", src = "main.cue" })"#)
        .eval()?;
      assert_eq!(result.get::<String>("kind")?, "binary");

      let manifest = manifest.borrow();
      let decl = &manifest.binaries[&label("cfg")];
      assert_eq!(decl.src, PathBuf::from("/project/main.cue"));
      assert_eq!(decl.output_format, OutputFormat::Json);
      assert!(!decl.escape);
      assert_eq!(decl.output_name, None);
      Ok(())
    }

    #[test]
    fn records_format_escape_and_output_name() -> LuaResult<()> {
      let (lua, manifest) = create_test_lua_with_manifest()?;

      lua
        .load(
          r#"
            local lib = cuebuild.library({ name = "lib", import_path = "x/lib", srcs = { "l.cue" } })
            cuebuild.binary({
              name = "cfg",
              src = "main.cue",
              deps = { lib },
              output_format = "yaml",
              escape = true,
              output_name = "config.yaml",
            })
          "#,
        )
        .exec()?;

      let manifest = manifest.borrow();
      let decl = &manifest.binaries[&label("cfg")];
      assert_eq!(decl.output_format, OutputFormat::Yaml);
      assert!(decl.escape);
      assert_eq!(decl.output_name.as_deref(), Some("config.yaml"));
      assert_eq!(decl.deps, vec![label("lib")]);
      Ok(())
    }

    #[test]
    fn unknown_format_is_error() {
      let (lua, _) = create_test_lua_with_manifest().unwrap();
      let err = lua
        .load(r#"cuebuild.binary({ name = "cfg", src = "main.cue", output_format = "toml" })"#)
        .exec()
        .unwrap_err();
      assert!(err.to_string().contains("unknown output format"));
    }
  }

  #[test]
  fn duplicate_label_is_error() {
    let (lua, _) = create_test_lua_with_manifest().unwrap();
    let err = lua
      .load(
        r#"
          cuebuild.library({ name = "same", import_path = "x/a", srcs = { "a.cue" } })
          cuebuild.binary({ name = "same", src = "main.cue" })
        "#,
      )
      .exec()
      .unwrap_err();
    assert!(err.to_string().contains("already declared"));
  }

  #[test]
  fn invalid_label_is_error() {
    let (lua, _) = create_test_lua_with_manifest().unwrap();
    let err = lua
      .load(r#"cuebuild.binary({ name = "has space", src = "main.cue" })"#)
      .exec()
      .unwrap_err();
    assert!(err.to_string().contains("invalid label"));
  }
}
