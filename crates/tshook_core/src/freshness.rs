//! Staleness checks for compiled output

use std::fs;
use std::io;
use std::path::Path;

/// Returns `true` when `source` must be recompiled to refresh `output`.
///
/// The source is expected to exist and a failure to stat it is returned as-is.
/// An output that cannot be stat'ed counts as stale. Otherwise the source is
/// stale only if it was modified strictly later than the output.
pub fn is_modified(source: &Path, output: &Path) -> io::Result<bool> {
    let source_mtime = fs::metadata(source)?.modified()?;

    let output_mtime = match fs::metadata(output).and_then(|meta| meta.modified()) {
        Ok(mtime) => mtime,
        Err(_) => return Ok(true),
    };

    Ok(source_mtime > output_mtime)
}
