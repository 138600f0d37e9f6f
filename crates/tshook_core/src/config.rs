//! Project configuration discovery
//!
//! Finds the `tsconfig.json` that governs a source file and turns its
//! `compilerOptions` into [`CompilerOptions`] with every path made absolute.

use crate::error::CompileError;
use crate::settings::HookSettings;
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Options whose value is a single path, relative to the config directory.
const PATH_OPTIONS: &[&str] = &[
    "outDir",
    "outFile",
    "out",
    "rootDir",
    "baseUrl",
    "declarationDir",
    "tsBuildInfoFile",
];

/// Options whose value is a list of paths, relative to the config directory.
const PATH_LIST_OPTIONS: &[&str] = &["typeRoots", "rootDirs"];

/// Compiler options read from a configuration file.
///
/// Keys keep the spelling used in `compilerOptions`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompilerOptions {
    entries: Map<String, Value>,
}

impl CompilerOptions {
    /// Converts a raw `compilerOptions` object, resolving relative paths
    /// against `base_dir`.
    pub fn from_json(raw: &Map<String, Value>, base_dir: &Path) -> Self {
        let mut entries = Map::new();

        for (name, value) in raw {
            let value = match value {
                Value::Null => continue,
                Value::String(path) if PATH_OPTIONS.contains(&name.as_str()) => {
                    Value::String(resolve_path(base_dir, path))
                }
                Value::Array(items) if PATH_LIST_OPTIONS.contains(&name.as_str()) => Value::Array(
                    items
                        .iter()
                        .map(|item| match item {
                            Value::String(path) => Value::String(resolve_path(base_dir, path)),
                            other => other.clone(),
                        })
                        .collect(),
                ),
                other => other.clone(),
            };
            entries.insert(name.clone(), value);
        }

        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Absolute output directory, if one was configured.
    pub fn out_dir(&self) -> Option<&Path> {
        self.entries
            .get("outDir")
            .and_then(Value::as_str)
            .map(Path::new)
    }
}

impl fmt::Display for CompilerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.entries.clone()))
    }
}

/// A configuration file and the options it yields for one source file.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config_path: PathBuf,
    /// Directory holding the configuration; relative paths are anchored here.
    pub config_dir: PathBuf,
    pub options: CompilerOptions,
}

/// Locates and reads the configuration governing a source file.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    config_file_name: String,
}

impl ConfigResolver {
    pub fn new(config_file_name: impl Into<String>) -> Self {
        Self {
            config_file_name: config_file_name.into(),
        }
    }

    pub fn from_settings(settings: &HookSettings) -> Self {
        Self::new(settings.config_file_name.clone())
    }

    pub fn resolve(&self, source: &Path, debug: bool) -> Result<ResolvedConfig, CompileError> {
        let search_dir = source.parent().unwrap_or_else(|| Path::new("."));

        // Sibling first, then the usual upward search.
        let sibling = search_dir.join(&self.config_file_name);
        let config_path = if sibling.is_file() {
            Some(sibling)
        } else {
            find_config_file(search_dir, &self.config_file_name)
        };

        let Some(config_path) = config_path else {
            return Err(CompileError::ConfigNotFound {
                source_file: source.to_path_buf(),
            });
        };
        let config_dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        if debug {
            tracing::info!("Compiling {}", source.display());
            tracing::info!("  searchPath: {}", search_dir.display());
            tracing::info!("  configFileName: {}", config_path.display());
        }

        let text = fs::read_to_string(&config_path).map_err(|source| CompileError::ConfigRead {
            path: config_path.clone(),
            source,
        })?;
        let raw = parse_config_text(&config_path, &text)?;

        let options = match raw.get("compilerOptions") {
            None | Some(Value::Null) => CompilerOptions::default(),
            Some(Value::Object(map)) => CompilerOptions::from_json(map, &config_dir),
            Some(_) => {
                return Err(CompileError::ConfigParse {
                    path: config_path,
                    message: "'compilerOptions' must be an object".to_string(),
                })
            }
        };

        Ok(ResolvedConfig {
            config_path,
            config_dir,
            options,
        })
    }
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::new("tsconfig.json")
    }
}

/// Walks from `start` towards the root and returns the first `file_name` found.
pub fn find_config_file(start: &Path, file_name: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(file_name))
        .find(|candidate| candidate.is_file())
}

/// Parses configuration text. Comments and trailing commas are accepted.
pub fn parse_config_text(path: &Path, text: &str) -> Result<Map<String, Value>, CompileError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    if text.trim().is_empty() {
        return Ok(Map::new());
    }

    match json5::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(CompileError::ConfigParse {
            path: path.to_path_buf(),
            message: "expected a JSON object".to_string(),
        }),
        Err(err) => Err(CompileError::ConfigParse {
            path: path.to_path_buf(),
            message: err.to_string(),
        }),
    }
}

fn resolve_path(base_dir: &Path, path: &str) -> String {
    normalize_path(&base_dir.join(path)).to_string_lossy().into_owned()
}

/// Lexically removes `.` and `..` components.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out
}
