//! Runs a whole job in-process, with no coordinator and no workers.
//!
//! Every input file is mapped in one piece, all pairs are grouped in
//! memory and reduced in key order. The result is the reference a
//! distributed run is compared against: concatenating and sorting the
//! `mapreduce-out-*` files of a distributed job gives the same lines.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::worker::reduce_sorted;
use crate::*;

/// Maps every file named by `inputs` (globs allowed) and reduces the
/// result. Returns the output pairs sorted by key.
pub fn run(inputs: &[String], workload: &Workload) -> Result<Vec<KeyValue>> {
    let files = utils::expand_inputs(inputs)?;
    let mut pairs = Vec::new();
    for file in &files {
        let bytes = fs::read(file).with_context(|| format!("cannot read input file {file}"))?;
        let contents = String::from_utf8_lossy(&bytes).into_owned();
        for item in (workload.map_fn)(file.clone(), contents)? {
            pairs.push(item?);
        }
    }
    info!("mapped {} files into {} pairs", files.len(), pairs.len());
    reduce_sorted(workload, pairs)
}

/// Writes `pairs` as `key value` lines to `path`.
pub fn write_output(path: &Path, pairs: &[KeyValue]) -> Result<()> {
    utils::write_atomically(path, codec::format_output(pairs).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_count_over_two_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "the cat\nthe hat\n").unwrap();
        fs::write(dir.path().join("b.txt"), "a cat").unwrap();
        let pattern = format!("{}/*.txt", dir.path().display());

        let out = run(&[pattern], &workload::named("wc").unwrap()).unwrap();
        assert_eq!(
            codec::format_output(&out),
            "a 1\ncat 2\nhat 1\nthe 2\n"
        );

        let path = dir.path().join("mapreduce-out-0");
        write_output(&path, &out).unwrap();
        assert_eq!(codec::parse_output(&fs::read_to_string(path).unwrap()), out);
    }

    #[test]
    fn indexer_names_each_document() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, "apple pie").unwrap();
        fs::write(&b, "apple tart").unwrap();
        let inputs = [a.display().to_string(), b.display().to_string()];

        let out = run(&inputs, &workload::named("indexer").unwrap()).unwrap();
        assert_eq!(out[0].key, "apple");
        assert_eq!(out[0].value, format!("2 {},{}", inputs[0], inputs[1]));
    }

    #[test]
    fn missing_input_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope").display().to_string();
        assert!(run(&[missing], &workload::named("wc").unwrap()).is_err());
    }
}
