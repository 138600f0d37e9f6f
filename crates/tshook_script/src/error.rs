use rquickjs::{CaughtError, Ctx, Exception};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or running a module.
///
/// Unlike compile errors these always reach the caller of `require`.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// Engine error. `Exception` means a JS exception is still pending in the
    /// runtime; [`ScriptError::catch`] takes it out.
    #[error("script engine error: {0}")]
    Js(#[from] rquickjs::Error),

    #[error("{message}")]
    Exception {
        message: String,
        stack: Option<String>,
    },

    #[error("cannot find module '{specifier}' from {}", from.display())]
    ModuleNotFound { specifier: String, from: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("module exports are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to check {} for changes: {source}", source_file.display())]
    Freshness {
        source_file: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ScriptError {
    /// Hands the error back to JavaScript from inside a callback.
    ///
    /// A pending exception keeps unwinding untouched; anything else is thrown
    /// as a new `Error`.
    pub fn throw(self, ctx: &Ctx<'_>) -> rquickjs::Error {
        match self {
            ScriptError::Js(err) => err,
            other => Exception::throw_message(ctx, &other.to_string()),
        }
    }

    /// Takes a pending JS exception out of the runtime into an owned error.
    pub fn catch(self, ctx: &Ctx<'_>) -> Self {
        let err = match self {
            ScriptError::Js(err @ rquickjs::Error::Exception) => err,
            other => return other,
        };

        match CaughtError::from_error(ctx, err) {
            CaughtError::Exception(ex) => ScriptError::Exception {
                message: ex.message().unwrap_or_default(),
                stack: ex.stack(),
            },
            CaughtError::Value(value) => ScriptError::Exception {
                message: value
                    .get::<rquickjs::Coerced<String>>()
                    .map(|s| s.0)
                    .unwrap_or_else(|_| format!("{value:?}")),
                stack: None,
            },
            CaughtError::Error(err) => ScriptError::Js(err),
        }
    }
}
