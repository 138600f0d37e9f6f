//! Load hook for typed sources
//!
//! [`LoadInterceptor`] is registered with the module host for each source
//! extension. It compiles a source when there is no usable output for it,
//! runs the output in the sandbox and remembers where the output lives.

use crate::error::ScriptError;
use crate::module::{ExtensionHandler, ModuleBinding};
use crate::sandbox;
use rquickjs::Ctx;
use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};
use tshook_core::{compile_file, is_modified, CompilationCache, ConfigResolver, HookSettings, Toolchain, TscToolchain};

/// Counters for what the hook did with each load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub compilations: usize,
    pub cache_hits: usize,
    /// Loads where compiling failed and nothing was run.
    pub aborted: usize,
}

/// Compile-on-load handler.
pub struct LoadInterceptor<T: Toolchain = TscToolchain> {
    settings: HookSettings,
    resolver: ConfigResolver,
    toolchain: T,
    cache: RefCell<CompilationCache>,
    stats: Cell<LoadStats>,
}

impl LoadInterceptor<TscToolchain> {
    pub fn new(settings: HookSettings) -> Self {
        let toolchain = TscToolchain::from_settings(&settings);
        Self::with_toolchain(settings, toolchain)
    }
}

impl<T: Toolchain> LoadInterceptor<T> {
    pub fn with_toolchain(settings: HookSettings, toolchain: T) -> Self {
        Self {
            resolver: ConfigResolver::from_settings(&settings),
            settings,
            toolchain,
            cache: RefCell::new(CompilationCache::new()),
            stats: Cell::new(LoadStats::default()),
        }
    }

    pub fn stats(&self) -> LoadStats {
        self.stats.get()
    }

    /// Output last produced for `source`, if any.
    pub fn cached_output(&self, source: &Path) -> Option<PathBuf> {
        self.cache.borrow().get(source).map(Path::to_path_buf)
    }

    fn record(&self, update: impl FnOnce(&mut LoadStats)) {
        let mut stats = self.stats.get();
        update(&mut stats);
        self.stats.set(stats);
    }

    /// Picks the output to run for `source`, compiling if needed.
    ///
    /// `Ok(None)` means compilation failed and has already been reported.
    fn output_for(&self, source: &Path) -> Result<Option<PathBuf>, ScriptError> {
        if let Some(cached) = self.cached_output(source) {
            let stale = is_modified(source, &cached).map_err(|err| ScriptError::Freshness {
                source_file: source.to_path_buf(),
                source: err,
            })?;
            if !stale {
                tracing::info!("  Skipping {}", source.display());
                self.record(|stats| stats.cache_hits += 1);
                return Ok(Some(cached));
            }
        }

        let debug = self.settings.debug_enabled();
        match compile_file(source, &self.resolver, &self.toolchain, debug) {
            Ok(output) => {
                self.record(|stats| stats.compilations += 1);
                Ok(Some(output))
            }
            Err(err) => {
                tracing::error!("{err}");
                self.record(|stats| stats.aborted += 1);
                Ok(None)
            }
        }
    }
}

impl<T: Toolchain> ExtensionHandler for LoadInterceptor<T> {
    fn load<'js>(&self, ctx: &Ctx<'js>, module: &ModuleBinding<'js>) -> Result<(), ScriptError> {
        let source = module.filename()?;
        let Some(output) = self.output_for(&source)? else {
            return Ok(());
        };

        tracing::info!("  Running {}", output.display());
        // Nested requires come back into this handler; no borrow is held here.
        sandbox::run(ctx, &output, module)?;

        self.cache.borrow_mut().insert(source, output);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ScriptRuntime;
    use std::fs::{self, File};
    use std::rc::Rc;
    use std::time::{Duration, SystemTime};
    use tshook_core::{CompileError, Emission, ResolvedConfig};

    /// Stands in for `tsc`: copies the source to `<outDir>/<run>/<stem>.js`
    /// and writes the usual side files. Each run writes to a new directory.
    struct FakeToolchain {
        runs: Rc<Cell<usize>>,
        emit_script: bool,
    }

    impl Toolchain for FakeToolchain {
        fn emit(&self, source: &Path, config: &ResolvedConfig) -> Result<Emission, CompileError> {
            let run = self.runs.get() + 1;
            self.runs.set(run);

            let out_dir = config
                .options
                .out_dir()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| source.parent().unwrap().to_path_buf())
                .join(run.to_string());
            fs::create_dir_all(&out_dir).unwrap();
            let stem = source.file_stem().unwrap().to_string_lossy().into_owned();

            let mut emission = Emission::new();
            if self.emit_script {
                let script = out_dir.join(format!("{stem}.js"));
                fs::copy(source, &script).unwrap();
                emission.push(script);
                let map = out_dir.join(format!("{stem}.js.map"));
                fs::write(&map, "{}").unwrap();
                emission.push(map);
            }
            let declaration = out_dir.join(format!("{stem}.d.ts"));
            fs::write(&declaration, "export {};").unwrap();
            emission.push(declaration);
            Ok(emission)
        }
    }

    struct Project {
        dir: tempfile::TempDir,
        runs: Rc<Cell<usize>>,
        hook: Rc<LoadInterceptor<FakeToolchain>>,
        runtime: ScriptRuntime,
    }

    impl Project {
        fn new(config: Option<&str>, emit_script: bool) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let mut settings = HookSettings::default();
            match config {
                Some(text) => fs::write(dir.path().join("tsconfig.json"), text).unwrap(),
                None => settings.config_file_name = "tshook-test-missing.json".to_string(),
            }

            let runs = Rc::new(Cell::new(0));
            let toolchain = FakeToolchain {
                runs: runs.clone(),
                emit_script,
            };
            let hook = Rc::new(LoadInterceptor::with_toolchain(settings, toolchain));
            let runtime = ScriptRuntime::new().unwrap();
            runtime.register("ts", hook.clone());

            Self {
                dir,
                runs,
                hook,
                runtime,
            }
        }

        fn with_out_dir() -> Self {
            Self::new(Some(r#"{ "compilerOptions": { "outDir": "out" } }"#), true)
        }

        fn source(&self, name: &str, text: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, text).unwrap();
            path
        }
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    #[test]
    fn test_first_load_compiles_and_runs() {
        let project = Project::with_out_dir();
        let source = project.source("a.ts", "exports.value = 42;");

        let exports = project.runtime.load_exports(&source).unwrap();

        assert_eq!(exports, serde_json::json!({ "value": 42 }));
        assert_eq!(project.runs.get(), 1);
        assert_eq!(project.hook.cached_output(&source), Some(project.dir.path().join("out/1/a.js")));
        assert_eq!(
            project.hook.stats(),
            LoadStats {
                compilations: 1,
                cache_hits: 0,
                aborted: 0
            }
        );
    }

    #[test]
    fn test_fresh_output_is_reused() {
        let project = Project::with_out_dir();
        let source = project.source("a.ts", "exports.value = 1; exports.list = [1, 2];");

        let first = project.runtime.load_exports(&source).unwrap();
        assert!(project.runtime.evict(&source));
        let second = project.runtime.load_exports(&source).unwrap();

        assert_eq!(first, second);
        assert_eq!(project.runs.get(), 1);
        assert_eq!(project.hook.stats().cache_hits, 1);
    }

    #[test]
    fn test_stale_output_is_recompiled() {
        let project = Project::with_out_dir();
        let source = project.source("a.ts", "exports.value = 1;");
        project.runtime.run_main(&source).unwrap();
        let output = project.hook.cached_output(&source).unwrap();

        fs::write(&source, "exports.value = 2;").unwrap();
        set_mtime(&output, SystemTime::now() - Duration::from_secs(60));
        set_mtime(&source, SystemTime::now());
        project.runtime.evict(&source);

        let exports = project.runtime.load_exports(&source).unwrap();
        assert_eq!(exports["value"], 2);
        assert_eq!(project.runs.get(), 2);
        let recompiled = project.dir.path().join("out/2/a.js");
        assert_ne!(output, recompiled);
        assert_eq!(project.hook.cached_output(&source), Some(recompiled));
        assert_eq!(project.hook.stats().cache_hits, 0);
    }

    #[test]
    fn test_missing_config_skips_execution() {
        let project = Project::new(None, true);
        let source = project.source("a.ts", "exports.value = 1;");

        let exports = project.runtime.load_exports(&source).unwrap();

        assert_eq!(exports, serde_json::json!({}));
        assert_eq!(project.runs.get(), 0);
        assert_eq!(project.hook.cached_output(&source), None);
        assert_eq!(project.hook.stats().aborted, 1);
    }

    #[test]
    fn test_malformed_config_skips_execution() {
        let project = Project::new(Some("{ compilerOptions: "), true);
        let source = project.source("a.ts", "exports.value = 1;");

        let exports = project.runtime.load_exports(&source).unwrap();

        assert_eq!(exports, serde_json::json!({}));
        assert_eq!(project.runs.get(), 0);
        assert_eq!(project.hook.stats().aborted, 1);
    }

    #[test]
    fn test_no_script_emitted_skips_execution() {
        let project = Project::new(Some(r#"{ "compilerOptions": {} }"#), false);
        let source = project.source("types.ts", "exports.value = 1;");

        let exports = project.runtime.load_exports(&source).unwrap();

        assert_eq!(exports, serde_json::json!({}));
        assert_eq!(project.runs.get(), 1);
        assert_eq!(project.hook.cached_output(&source), None);
        assert_eq!(project.hook.stats().aborted, 1);
    }

    #[test]
    fn test_filename_and_dirname() {
        let project = Project::with_out_dir();
        let source = project.source(
            "src/a.ts",
            "exports.filename = __filename; exports.dirname = __dirname;",
        );

        let exports = project.runtime.load_exports(&source).unwrap();

        let out = project.dir.path().join("out/1/a.js");
        let src = project.dir.path().join("src");
        assert_eq!(exports["filename"], out.to_string_lossy().as_ref());
        assert_eq!(exports["dirname"], src.to_string_lossy().as_ref());
    }

    #[test]
    fn test_require_resolves_from_source_directory() {
        let project = Project::with_out_dir();
        project.source("src/lib/math.ts", "exports.double = (n) => n * 2;");
        project.source("src/data.json", r#"{ "base": 21 }"#);
        let main = project.source(
            "src/main.ts",
            "const math = require('./lib/math');\n\
             exports.answer = math.double(require('./data.json').base);\n",
        );

        let exports = project.runtime.load_exports(&main).unwrap();

        assert_eq!(exports["answer"], 42);
        assert_eq!(project.runs.get(), 2);
    }

    #[test]
    fn test_runtime_error_propagates_without_caching() {
        let project = Project::with_out_dir();
        let source = project.source("a.ts", "throw new Error('bad module');");

        match project.runtime.run_main(&source) {
            Err(ScriptError::Exception { message, .. }) => assert_eq!(message, "bad module"),
            other => panic!("expected Exception, got {other:?}"),
        }
        assert_eq!(project.hook.cached_output(&source), None);
        assert_eq!(project.hook.stats().compilations, 1);
    }
}
