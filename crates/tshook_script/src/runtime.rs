//! Script runtime management
//!
//! Owns the QuickJS runtime, the host context and the module host. Everything
//! that touches JS goes through [`ScriptRuntime`].

use crate::error::ScriptError;
use crate::module::{ExtensionHandler, ModuleHost};
use rquickjs::function::Rest;
use rquickjs::{Coerced, Context, Ctx, FromJs, Function, Object, Runtime};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::Level;
use tshook_core::config::normalize_path;

/// Script execution context
pub struct ScriptRuntime {
    // Field order matters: module objects go before the context, the context
    // before the runtime.
    host: Rc<ModuleHost>,
    context: Context,
    #[allow(dead_code)] // Kept alive for context lifetime
    runtime: Runtime,
}

impl ScriptRuntime {
    pub fn new() -> Result<Self, ScriptError> {
        let runtime = Runtime::new()?;
        let context = Context::full(&runtime)?;
        context.with(|ctx| install_console(&ctx))?;

        Ok(Self {
            host: ModuleHost::new(),
            context,
            runtime,
        })
    }

    pub fn host(&self) -> &Rc<ModuleHost> {
        &self.host
    }

    /// Registers a loader for files ending in `extension`.
    pub fn register(&self, extension: &str, handler: Rc<dyn ExtensionHandler>) {
        self.host.register(extension, handler);
    }

    /// Loads `path` as the entry module.
    pub fn run_main(&self, path: &Path) -> Result<(), ScriptError> {
        let path = absolute(path)?;
        self.context.with(|ctx| {
            self.host
                .load(&ctx, &path)
                .map(|_| ())
                .map_err(|err| err.catch(&ctx))
        })
    }

    /// Loads `path` (or reuses it if already loaded) and returns its exports
    /// as JSON.
    pub fn load_exports(&self, path: &Path) -> Result<serde_json::Value, ScriptError> {
        let path = absolute(path)?;
        let text = self.context.with(|ctx| {
            self.exports_text(&ctx, &path)
                .map_err(|err| err.catch(&ctx))
        })?;

        match text {
            Some(text) => Ok(serde_json::from_str(&text)?),
            None => Ok(serde_json::Value::Null),
        }
    }

    fn exports_text(&self, ctx: &Ctx<'_>, path: &Path) -> Result<Option<String>, ScriptError> {
        let exports = self.host.load(ctx, path)?.exports()?;
        match ctx.json_stringify(exports)? {
            Some(text) => Ok(Some(text.to_string()?)),
            None => Ok(None),
        }
    }

    /// Forgets a loaded module so the next load runs it again.
    pub fn evict(&self, path: &Path) -> bool {
        match absolute(path) {
            Ok(path) => self.host.evict(&path),
            Err(_) => false,
        }
    }

    /// Evaluates `source` in the host context.
    pub fn execute<V>(&self, source: &str) -> Result<V, ScriptError>
    where
        V: for<'js> FromJs<'js>,
    {
        self.context.with(|ctx| {
            ctx.eval::<V, _>(source)
                .map_err(|err| ScriptError::from(err).catch(&ctx))
        })
    }
}

impl Drop for ScriptRuntime {
    fn drop(&mut self) {
        // Module objects are held outside the GC; release them while the
        // runtime is still alive.
        self.context.with(|ctx| {
            self.host.clear();
            ctx.run_gc();
        });
    }
}

fn absolute(path: &Path) -> Result<PathBuf, ScriptError> {
    let path = std::path::absolute(path).map_err(|source| ScriptError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(normalize_path(&path))
}

fn install_console(ctx: &Ctx<'_>) -> Result<(), rquickjs::Error> {
    let console = Object::new(ctx.clone())?;
    for (name, level) in [
        ("log", Level::INFO),
        ("info", Level::INFO),
        ("debug", Level::DEBUG),
        ("warn", Level::WARN),
        ("error", Level::ERROR),
    ] {
        let function = Function::new(ctx.clone(), move |args: Rest<Coerced<String>>| {
            let line = args
                .0
                .into_iter()
                .map(|arg| arg.0)
                .collect::<Vec<_>>()
                .join(" ");
            if level == Level::ERROR {
                tracing::error!(target: "console", "{line}");
            } else if level == Level::WARN {
                tracing::warn!(target: "console", "{line}");
            } else if level == Level::DEBUG {
                tracing::debug!(target: "console", "{line}");
            } else {
                tracing::info!(target: "console", "{line}");
            }
        })?
        .with_name(name)?;
        console.set(name, function)?;
    }
    ctx.globals().set("console", console)
}
