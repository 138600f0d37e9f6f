//! tshook Runtime
//!
//! Runs TypeScript entry points, compiling them (and anything they require)
//! on first load.
//!
//! Usage: `tshook <entry>...`

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::rc::Rc;
use tracing::Level;
use tshook_core::HookSettings;
use tshook_script::{LoadInterceptor, ScriptError, ScriptRuntime};

fn main() -> Result<()> {
    let settings = HookSettings::from_env();

    // Initialize logging
    let level = if settings.debug_enabled() {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    tracing::info!("tshook v{}", tshook_core::VERSION);

    let entries: Vec<PathBuf> = std::env::args_os().skip(1).map(PathBuf::from).collect();
    if entries.is_empty() {
        bail!("usage: tshook <entry>...");
    }

    let runtime = ScriptRuntime::new().context("failed to start the script runtime")?;
    let hook = Rc::new(LoadInterceptor::new(settings.clone()));
    for extension in &settings.extensions {
        runtime.register(extension, hook.clone());
    }

    for entry in &entries {
        if let Err(err) = runtime.run_main(entry) {
            if let ScriptError::Exception {
                stack: Some(stack), ..
            } = &err
            {
                tracing::error!("{stack}");
            }
            return Err(err).with_context(|| format!("{} failed", entry.display()));
        }
    }

    let stats = hook.stats();
    tracing::debug!(
        compilations = stats.compilations,
        cache_hits = stats.cache_hits,
        aborted = stats.aborted,
        "done"
    );

    Ok(())
}
