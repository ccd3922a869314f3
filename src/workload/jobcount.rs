//! A pseudo-application that counts how many times map tasks run.
//!
//! Every map invocation leaves a marker file in the current directory and
//! then takes a few seconds. The single reduce key reports the number of
//! markers, which equals the number of map tasks only if no task was
//! handed out twice. Run it with workers whose current directory is the
//! job's work directory.

use crate::*;
use anyhow::{Context, Result};
use rand::Rng;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const MARKER_PREFIX: &str = "mapreduce-worker-jobcount-";

static INVOCATIONS: AtomicUsize = AtomicUsize::new(0);

/// Leaves a marker unique to this process and invocation in `dir`.
fn write_marker(dir: &Path) -> Result<()> {
    let n = INVOCATIONS.fetch_add(1, Ordering::SeqCst);
    let path = dir.join(format!("{MARKER_PREFIX}{}-{n}", std::process::id()));
    fs::write(&path, b"x").with_context(|| format!("cannot write {}", path.display()))
}

fn count_markers(dir: &Path) -> Result<usize> {
    let mut count = 0;
    for entry in fs::read_dir(dir)? {
        if entry?.file_name().to_string_lossy().starts_with(MARKER_PREFIX) {
            count += 1;
        }
    }
    Ok(count)
}

pub fn map(_filename: String, _contents: String) -> MapOutput {
    write_marker(Path::new("."))?;
    let pause = rand::thread_rng().gen_range(2000..5000);
    std::thread::sleep(Duration::from_millis(pause));
    Ok(Box::new(std::iter::once(Ok(KeyValue::new("a", "x")))))
}

pub fn reduce(_key: &str, _values: Box<dyn Iterator<Item = String> + '_>) -> Result<String> {
    Ok(count_markers(Path::new("."))?.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_invocation_leaves_its_own_marker() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("mapreduce-1000-0"), b"[]").unwrap();
        for _ in 0..3 {
            write_marker(dir.path()).unwrap();
        }
        assert_eq!(count_markers(dir.path()).unwrap(), 3);
    }
}
