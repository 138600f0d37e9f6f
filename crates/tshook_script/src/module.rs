//! Module host
//!
//! CommonJS-style module system for scripts running on QuickJS. Files are
//! dispatched by extension to an [`ExtensionHandler`]; the load hook plugs in
//! here by registering itself for the typed source extension.

use crate::error::ScriptError;
use crate::sandbox;
use rquickjs::{Ctx, Exception, Function, Object, Persistent, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};
use tshook_core::config::normalize_path;

/// Loads one kind of file into a module object.
pub trait ExtensionHandler {
    /// Populates `module.exports` for the file named by `module.filename`.
    fn load<'js>(&self, ctx: &Ctx<'js>, module: &ModuleBinding<'js>) -> Result<(), ScriptError>;
}

/// The JS `module` object handed to a running file.
#[derive(Debug, Clone)]
pub struct ModuleBinding<'js> {
    object: Object<'js>,
}

impl<'js> ModuleBinding<'js> {
    fn new(ctx: &Ctx<'js>, filename: &Path, require: Function<'js>) -> Result<Self, ScriptError> {
        let name = filename.to_string_lossy().into_owned();
        let object = Object::new(ctx.clone())?;
        object.set("id", name.as_str())?;
        object.set("filename", name.as_str())?;
        object.set("loaded", false)?;
        object.set("exports", Object::new(ctx.clone())?)?;
        object.set("require", require)?;
        Ok(Self { object })
    }

    pub fn from_object(object: Object<'js>) -> Self {
        Self { object }
    }

    pub fn object(&self) -> &Object<'js> {
        &self.object
    }

    pub fn filename(&self) -> Result<PathBuf, ScriptError> {
        let name: String = self.object.get("filename")?;
        Ok(PathBuf::from(name))
    }

    /// Directory of `filename`.
    pub fn dirname(&self) -> Result<PathBuf, ScriptError> {
        let filename = self.filename()?;
        Ok(filename.parent().map(Path::to_path_buf).unwrap_or_default())
    }

    pub fn exports(&self) -> Result<Value<'js>, ScriptError> {
        Ok(self.object.get("exports")?)
    }

    pub fn set_exports(&self, exports: Value<'js>) -> Result<(), ScriptError> {
        Ok(self.object.set("exports", exports)?)
    }

    /// `require` bound to this module's directory.
    pub fn require(&self) -> Result<Function<'js>, ScriptError> {
        Ok(self.object.get("require")?)
    }

    fn set_loaded(&self, loaded: bool) -> Result<(), ScriptError> {
        Ok(self.object.set("loaded", loaded)?)
    }
}

/// Runs `.js` files through the sandbox as they are.
pub struct ScriptHandler;

impl ExtensionHandler for ScriptHandler {
    fn load<'js>(&self, ctx: &Ctx<'js>, module: &ModuleBinding<'js>) -> Result<(), ScriptError> {
        let filename = module.filename()?;
        tracing::debug!("  Running {}", filename.display());
        sandbox::run(ctx, &filename, module)?;
        Ok(())
    }
}

/// Parses `.json` files into `module.exports`.
pub struct JsonHandler;

impl ExtensionHandler for JsonHandler {
    fn load<'js>(&self, ctx: &Ctx<'js>, module: &ModuleBinding<'js>) -> Result<(), ScriptError> {
        let filename = module.filename()?;
        let text = fs::read_to_string(&filename).map_err(|source| ScriptError::Io {
            path: filename.clone(),
            source,
        })?;
        module.set_exports(ctx.json_parse(text)?)
    }
}

/// Extension registry plus the cache of loaded modules.
pub struct ModuleHost {
    me: Weak<ModuleHost>,
    handlers: RefCell<Vec<(String, Rc<dyn ExtensionHandler>)>>,
    modules: RefCell<HashMap<PathBuf, Persistent<Object<'static>>>>,
}

impl ModuleHost {
    /// Host with the `.js` and `.json` handlers registered.
    pub fn new() -> Rc<Self> {
        Rc::new_cyclic(|me| {
            let handlers: Vec<(String, Rc<dyn ExtensionHandler>)> = vec![
                ("js".to_string(), Rc::new(ScriptHandler) as Rc<dyn ExtensionHandler>),
                ("json".to_string(), Rc::new(JsonHandler) as Rc<dyn ExtensionHandler>),
            ];
            ModuleHost {
                me: me.clone(),
                handlers: RefCell::new(handlers),
                modules: RefCell::new(HashMap::new()),
            }
        })
    }

    /// Registers `handler` for files ending in `extension`, replacing any
    /// handler already registered for it.
    pub fn register(&self, extension: &str, handler: Rc<dyn ExtensionHandler>) {
        let extension = extension.trim_start_matches('.').to_string();
        let mut handlers = self.handlers.borrow_mut();
        match handlers.iter_mut().find(|(ext, _)| *ext == extension) {
            Some(slot) => slot.1 = handler,
            None => handlers.push((extension, handler)),
        }
    }

    /// Registered extensions, in registration order.
    pub fn extensions(&self) -> Vec<String> {
        self.handlers
            .borrow()
            .iter()
            .map(|(ext, _)| ext.clone())
            .collect()
    }

    fn handler_for(&self, path: &Path) -> Rc<dyn ExtensionHandler> {
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let handlers = self.handlers.borrow();
        handlers
            .iter()
            .find(|(ext, _)| ext == extension)
            .or_else(|| handlers.iter().find(|(ext, _)| ext == "js"))
            .map(|(_, handler)| handler.clone())
            .unwrap_or_else(|| Rc::new(ScriptHandler) as Rc<dyn ExtensionHandler>)
    }

    /// Maps a `require` specifier to a file.
    pub fn resolve(&self, specifier: &str, from_dir: &Path) -> Result<PathBuf, ScriptError> {
        let extensions = self.extensions();
        let lookup = |base: &Path| {
            resolve_file(base, &extensions).or_else(|| resolve_directory(base, &extensions))
        };

        let found = if is_path_specifier(specifier) {
            lookup(&normalize_path(&from_dir.join(specifier)))
        } else {
            from_dir
                .ancestors()
                .map(|dir| dir.join("node_modules").join(specifier))
                .find_map(|base| lookup(&base))
        };

        found.ok_or_else(|| ScriptError::ModuleNotFound {
            specifier: specifier.to_string(),
            from: from_dir.to_path_buf(),
        })
    }

    /// Resolves and loads `specifier`, returning the module's exports.
    pub fn require<'js>(
        &self,
        ctx: &Ctx<'js>,
        specifier: &str,
        from_dir: &Path,
    ) -> Result<Value<'js>, ScriptError> {
        let path = self.resolve(specifier, from_dir)?;
        self.load(ctx, &path)?.exports()
    }

    /// Loads the module at `path`, or returns it if it is already loaded.
    ///
    /// The module is registered before its handler runs so that circular
    /// requires see the partial exports.
    pub fn load<'js>(&self, ctx: &Ctx<'js>, path: &Path) -> Result<ModuleBinding<'js>, ScriptError> {
        let cached = self.modules.borrow().get(path).cloned();
        if let Some(saved) = cached {
            return Ok(ModuleBinding::from_object(saved.restore(ctx)?));
        }

        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let require = self.require_function(ctx, dir)?;
        let module = ModuleBinding::new(ctx, path, require)?;
        self.modules
            .borrow_mut()
            .insert(path.to_path_buf(), Persistent::save(ctx, module.object().clone()));

        let handler = self.handler_for(path);
        if let Err(err) = handler.load(ctx, &module) {
            self.modules.borrow_mut().remove(path);
            return Err(err);
        }

        module.set_loaded(true)?;
        Ok(module)
    }

    pub fn is_loaded(&self, path: &Path) -> bool {
        self.modules.borrow().contains_key(path)
    }

    /// Forgets a loaded module so the next `require` loads it again.
    pub fn evict(&self, path: &Path) -> bool {
        self.modules.borrow_mut().remove(path).is_some()
    }

    /// Drops every loaded module.
    pub fn clear(&self) {
        self.modules.borrow_mut().clear();
    }

    fn require_function<'js>(&self, ctx: &Ctx<'js>, base_dir: PathBuf) -> Result<Function<'js>, ScriptError> {
        // Weak: the module objects this function ends up in are owned by the host.
        let host = self.me.clone();
        let require = Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, specifier: String| -> rquickjs::Result<Value<'js>> {
                let Some(host) = host.upgrade() else {
                    return Err(Exception::throw_internal(&ctx, "module host is gone"));
                };
                host.require(&ctx, &specifier, &base_dir)
                    .map_err(|err| err.throw(&ctx))
            },
        )?;
        Ok(require.with_name("require")?)
    }
}

fn is_path_specifier(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
        || Path::new(specifier).is_absolute()
}

fn resolve_file(base: &Path, extensions: &[String]) -> Option<PathBuf> {
    if base.is_file() {
        return Some(base.to_path_buf());
    }
    extensions
        .iter()
        .map(|ext| {
            let mut name = base.as_os_str().to_owned();
            name.push(".");
            name.push(ext);
            PathBuf::from(name)
        })
        .find(|candidate| candidate.is_file())
}

fn resolve_directory(dir: &Path, extensions: &[String]) -> Option<PathBuf> {
    if !dir.is_dir() {
        return None;
    }

    if let Some(main) = package_main(dir) {
        let entry = normalize_path(&dir.join(main));
        if let Some(found) = resolve_file(&entry, extensions).or_else(|| index_file(&entry, extensions)) {
            return Some(found);
        }
    }

    index_file(dir, extensions)
}

fn index_file(dir: &Path, extensions: &[String]) -> Option<PathBuf> {
    extensions
        .iter()
        .map(|ext| dir.join(format!("index.{ext}")))
        .find(|candidate| candidate.is_file())
}

fn package_main(dir: &Path) -> Option<String> {
    let text = fs::read_to_string(dir.join("package.json")).ok()?;
    let manifest: serde_json::Value = serde_json::from_str(&text).ok()?;
    manifest.get("main")?.as_str().map(str::to_owned)
}
