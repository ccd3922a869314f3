//! Utility functions shared by the coordinator, the workers and the
//! binaries.

use anyhow::{bail, Context, Result};
use glob::glob;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Default interval between coordinator polls.
pub const DEFAULT_POLL: Duration = Duration::from_millis(500);

/// Installs the fmt subscriber used by every binary. The filter comes from
/// `RUST_LOG` and defaults to `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Writes `contents` to `path` so that readers see either the old file or
/// the complete new one, never a partial write.
///
/// The data goes to a temporary file in the same directory first and is
/// then renamed over `path`.
pub fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".mapreduce-tmp-")
        .tempfile_in(dir)
        .with_context(|| format!("failed to create temporary file in {}", dir.display()))?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .with_context(|| format!("failed to rename temporary file to {}", path.display()))?;
    Ok(())
}

/// Expands the input arguments of a job into file names.
///
/// An argument containing `*`, `?` or `[` is a glob pattern and expands to
/// its sorted matches; it is an error for a pattern to match nothing.
/// Other arguments are taken verbatim.
pub fn expand_inputs(inputs: &[String]) -> Result<Vec<String>> {
    let mut files = Vec::new();
    for input in inputs {
        if !input.contains(['*', '?', '[']) {
            files.push(input.clone());
            continue;
        }
        let mut matched = glob(input)
            .with_context(|| format!("invalid input pattern `{input}`"))?
            .filter_map(|entry| entry.ok())
            .filter(|path| path.is_file())
            .map(|path| path.to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        if matched.is_empty() {
            bail!("input pattern `{input}` matched no files");
        }
        matched.sort();
        files.append(&mut matched);
    }
    Ok(files)
}

/// Interprets a `POLL_MS` style setting. Anything that is not a positive
/// number of milliseconds falls back to [`DEFAULT_POLL`].
pub fn poll_interval(raw: Option<&str>) -> Duration {
    match raw.map(str::trim).map(str::parse::<u64>) {
        Some(Ok(ms)) if ms > 0 => Duration::from_millis(ms),
        Some(_) => {
            tracing::warn!("ignoring invalid poll interval {:?}", raw.unwrap_or_default());
            DEFAULT_POLL
        }
        None => DEFAULT_POLL,
    }
}
