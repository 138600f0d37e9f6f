//! tshook Core
//!
//! Engine-independent half of the load hook:
//! - Staleness checks between a source file and its compiled output
//! - `tsconfig.json` discovery and compiler option resolution
//! - Driving the external TypeScript toolchain for one source file
//! - The in-process source → output cache

pub mod cache;
pub mod compiler;
pub mod config;
pub mod error;
pub mod freshness;
pub mod settings;

pub use cache::CompilationCache;
pub use compiler::{compile_file, ArtifactKind, Emission, EmittedArtifact, Toolchain, TscToolchain};
pub use config::{CompilerOptions, ConfigResolver, ResolvedConfig};
pub use error::CompileError;
pub use freshness::is_modified;
pub use settings::HookSettings;

/// Hook version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
