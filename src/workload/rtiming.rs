//! A pseudo-application that shows whether reduce tasks run in parallel.
//!
//! Every reduce call announces itself with a marker file in the current
//! directory, counts the announcements present, holds its marker for a
//! second and removes it. An output value above 1 means two reduce calls
//! overlapped, which only happens across worker processes.

use crate::*;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const MARKER_PREFIX: &str = "mapreduce-worker-reduce-";

static CALLS: AtomicUsize = AtomicUsize::new(0);

/// Number of reduce calls running right now, this one included.
fn running_reducers(dir: &Path, hold: Duration) -> Result<usize> {
    let n = CALLS.fetch_add(1, Ordering::SeqCst);
    let mine = dir.join(format!("{MARKER_PREFIX}{}-{n}", std::process::id()));
    fs::write(&mine, b"x").with_context(|| format!("cannot write {}", mine.display()))?;

    let mut running = 0;
    for entry in fs::read_dir(dir)? {
        if entry?.file_name().to_string_lossy().starts_with(MARKER_PREFIX) {
            running += 1;
        }
    }

    std::thread::sleep(hold);
    fs::remove_file(&mine).with_context(|| format!("cannot remove {}", mine.display()))?;
    Ok(running)
}

pub fn map(_filename: String, _contents: String) -> MapOutput {
    let pairs = ["a", "b", "c", "d", "e", "f", "g", "h", "i", "j"]
        .into_iter()
        .map(|key| Ok(KeyValue::new(key, "1")));
    Ok(Box::new(pairs))
}

pub fn reduce(_key: &str, _values: Box<dyn Iterator<Item = String> + '_>) -> Result<String> {
    Ok(running_reducers(Path::new("."), Duration::from_secs(1))?.to_string())
}
