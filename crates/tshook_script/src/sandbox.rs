//! Execution sandbox
//!
//! Compiled output runs in its own realm: a fresh global object seeded with a
//! shallow copy of the host's globals plus the CommonJS bindings. Assignments
//! to globals inside the script stay inside the realm.

use crate::error::ScriptError;
use crate::module::ModuleBinding;
use rquickjs::context::EvalOptions;
use rquickjs::{qjs, Ctx, Object, Value};
use std::fs;
use std::path::Path;
use std::ptr::NonNull;

/// Runs the file at `output` as the body of `module` and returns the
/// script's completion value.
///
/// `__dirname` comes from the module (the original source), `__filename`
/// from the file actually executed.
pub fn run<'js>(ctx: &Ctx<'js>, output: &Path, module: &ModuleBinding<'js>) -> Result<Value<'js>, ScriptError> {
    let text = fs::read_to_string(output).map_err(|source| ScriptError::Io {
        path: output.to_path_buf(),
        source,
    })?;

    let realm = new_realm(ctx)?;
    let globals = realm.globals();
    copy_properties(&ctx.globals(), &globals)?;

    globals.set("require", module.require()?)?;
    globals.set("exports", module.exports()?)?;
    globals.set("__filename", output.to_string_lossy().as_ref())?;
    globals.set("__dirname", module.dirname()?.to_string_lossy().as_ref())?;
    globals.set("module", module.object().clone())?;
    globals.set("global", globals.clone())?;

    let mut options = EvalOptions::default();
    options.strict = false;
    Ok(realm.eval_with_options(text, options)?)
}

/// Creates a new context in the same runtime as `ctx`.
fn new_realm<'js>(ctx: &Ctx<'js>) -> Result<Ctx<'js>, ScriptError> {
    // SAFETY: the runtime lock is held for as long as `ctx` is alive, and the
    // new context belongs to the same runtime so `'js` is the right lifetime.
    // `from_raw` takes its own reference, so the one returned by
    // `JS_NewContext` is released straight away.
    unsafe {
        let rt = qjs::JS_GetRuntime(ctx.as_raw().as_ptr());
        let raw = NonNull::new(qjs::JS_NewContext(rt)).ok_or(rquickjs::Error::Allocation)?;
        let realm = Ctx::from_raw(raw);
        qjs::JS_FreeContext(raw.as_ptr());
        Ok(realm)
    }
}

/// Shallow copy of the enumerable own string-keyed properties of `from`.
fn copy_properties<'js>(from: &Object<'js>, to: &Object<'js>) -> Result<(), ScriptError> {
    for prop in from.props::<String, Value>() {
        let (key, value) = prop?;
        to.set(key, value)?;
    }
    Ok(())
}
