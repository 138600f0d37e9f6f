//! Compiler invocation
//!
//! The TypeScript compiler is an external program. [`Toolchain`] is the seam
//! the hook compiles through; [`TscToolchain`] runs a real `tsc` for exactly
//! one source file and reports every file it wrote as an [`Emission`].

use crate::config::{CompilerOptions, ConfigResolver, ResolvedConfig};
use crate::error::CompileError;
use crate::settings::HookSettings;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Prefix `tsc --listEmittedFiles` puts in front of each written file.
const EMITTED_PREFIX: &str = "TSFILE: ";

/// Options the invoker passes on the command line itself.
const RESERVED_OPTIONS: &[&str] = &["listEmittedFiles", "pretty"];

/// What kind of file the compiler wrote.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Runnable script output
    Script,
    SourceMap,
    Declaration,
    BuildInfo,
    Other,
}

impl ArtifactKind {
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        if name.ends_with(".d.ts") || name.ends_with(".d.mts") || name.ends_with(".d.cts") {
            return ArtifactKind::Declaration;
        }
        if name.ends_with(".map") {
            return ArtifactKind::SourceMap;
        }
        if name.ends_with(".tsbuildinfo") {
            return ArtifactKind::BuildInfo;
        }

        match path.extension().and_then(|e| e.to_str()) {
            Some("js" | "mjs" | "cjs" | "jsx") => ArtifactKind::Script,
            _ => ArtifactKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedArtifact {
    pub path: PathBuf,
    pub kind: ArtifactKind,
}

/// Files written by one compiler run, in write order.
#[derive(Debug, Clone, Default)]
pub struct Emission {
    artifacts: Vec<EmittedArtifact>,
}

impl Emission {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a written file, classifying it by name.
    pub fn push(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        let kind = ArtifactKind::from_path(&path);
        self.artifacts.push(EmittedArtifact { path, kind });
    }

    pub fn artifacts(&self) -> &[EmittedArtifact] {
        &self.artifacts
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn scripts(&self) -> impl DoubleEndedIterator<Item = &Path> {
        self.artifacts
            .iter()
            .filter(|a| a.kind == ArtifactKind::Script)
            .map(|a| a.path.as_path())
    }

    pub fn last_script(&self) -> Option<&Path> {
        self.scripts().next_back()
    }

    /// Picks the script compiled from `source`.
    ///
    /// Prefers the last script sharing the source's file stem, and falls back
    /// to the last script written.
    pub fn script_for(&self, source: &Path) -> Option<&Path> {
        let stem = source.file_stem();
        self.scripts()
            .rev()
            .find(|script| script.file_stem() == stem)
            .or_else(|| self.last_script())
    }

    /// Splits `tsc --listEmittedFiles` output into the emission and the
    /// remaining diagnostic lines.
    pub fn parse_listing(stdout: &str) -> (Self, Vec<&str>) {
        let mut emission = Self::new();
        let mut diagnostics = Vec::new();

        for line in stdout.lines() {
            let line = line.trim_end();
            if let Some(path) = line.strip_prefix(EMITTED_PREFIX) {
                emission.push(path.trim());
            } else if !line.trim().is_empty() {
                diagnostics.push(line);
            }
        }

        (emission, diagnostics)
    }
}

/// Compiles a single source file.
pub trait Toolchain {
    fn emit(&self, source: &Path, config: &ResolvedConfig) -> Result<Emission, CompileError>;
}

/// Runs the `tsc` command line compiler.
#[derive(Debug, Clone, Default)]
pub struct TscToolchain {
    program: Option<PathBuf>,
}

impl TscToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: Some(program.into()),
        }
    }

    pub fn from_settings(settings: &HookSettings) -> Self {
        Self {
            program: settings.compiler.clone(),
        }
    }

    /// Explicit program, else the project's local compiler, else `PATH`.
    pub fn locate(&self, config_dir: &Path) -> PathBuf {
        if let Some(program) = &self.program {
            return program.clone();
        }

        let bin = if cfg!(windows) { "tsc.cmd" } else { "tsc" };
        config_dir
            .ancestors()
            .map(|dir| dir.join("node_modules").join(".bin").join(bin))
            .find(|candidate| candidate.is_file())
            .unwrap_or_else(|| PathBuf::from(bin))
    }
}

impl Toolchain for TscToolchain {
    fn emit(&self, source: &Path, config: &ResolvedConfig) -> Result<Emission, CompileError> {
        let program = self.locate(&config.config_dir);

        // One-file project carrying the resolved options verbatim. Removed
        // again once `tsc` exits.
        let project = project_path(&config.config_dir, source);
        fs::write(&project, project_json(source, &config.options).to_string()).map_err(
            |source| CompileError::ProjectWrite {
                path: project.clone(),
                source,
            },
        )?;

        let output = Command::new(&program)
            .arg("-p")
            .arg(&project)
            .arg("--listEmittedFiles")
            .args(["--pretty", "false"])
            .current_dir(&config.config_dir)
            .output();

        if let Err(err) = fs::remove_file(&project) {
            tracing::warn!("  failed to remove {}: {}", project.display(), err);
        }

        let output = output.map_err(|source| CompileError::Toolchain {
            program: program.display().to_string(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let (emission, diagnostics) = Emission::parse_listing(&stdout);

        for line in diagnostics {
            tracing::warn!("  {}", line);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
            tracing::warn!("  {}", line);
        }
        if !output.status.success() {
            tracing::debug!("  {} exited with {}", program.display(), output.status);
        }

        Ok(emission)
    }
}

/// Where the one-file project for `source` is written.
fn project_path(config_dir: &Path, source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    config_dir.join(format!(".tshook-{}-{stem}.tsconfig.json", std::process::id()))
}

/// Project file that compiles exactly `source` with `options`.
pub fn project_json(source: &Path, options: &CompilerOptions) -> Value {
    let mut compiler_options = options.as_map().clone();
    for name in RESERVED_OPTIONS {
        compiler_options.remove(*name);
    }

    json!({
        "compilerOptions": compiler_options,
        "files": [source.to_string_lossy()],
        "include": []
    })
}

/// Resolves the configuration for `source`, compiles it and returns the
/// script to run in its place.
pub fn compile_file<T>(
    source: &Path,
    resolver: &ConfigResolver,
    toolchain: &T,
    debug: bool,
) -> Result<PathBuf, CompileError>
where
    T: Toolchain + ?Sized,
{
    let config = resolver.resolve(source, debug)?;

    if debug {
        tracing::info!("  resolved options: {}", config.options);
    }
    tracing::info!("  Compiling {}", source.display());

    let emission = toolchain.emit(source, &config)?;

    if debug {
        for artifact in emission.artifacts() {
            tracing::info!("  Writing {} ({:?})", artifact.path.display(), artifact.kind);
        }
        match emission.last_script() {
            Some(last) => tracing::info!("Last script file written: {}", last.display()),
            None => tracing::info!("No script file written"),
        }
    }

    emission
        .script_for(source)
        .map(Path::to_path_buf)
        .ok_or_else(|| CompileError::NoScriptEmitted {
            source_file: source.to_path_buf(),
        })
}
