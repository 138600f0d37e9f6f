use std::path::PathBuf;
use thiserror::Error;

/// Errors that stop a source file from being compiled.
///
/// None of these reach the script that called `require`: the hook reports
/// them and leaves the module unpopulated.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("unable to find configuration file for {}", source_file.display())]
    ConfigNotFound { source_file: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration in {}: {message}", path.display())]
    ConfigParse { path: PathBuf, message: String },

    #[error("failed to run compiler '{program}': {source}")]
    Toolchain {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write compiler project {}: {source}", path.display())]
    ProjectWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("compiler emitted no script for {}", source_file.display())]
    NoScriptEmitted { source_file: PathBuf },
}
