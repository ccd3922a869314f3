//! On-disk formats shared by coordinator and workers.
//!
//! Intermediate files are named `mapreduce-<map task>-<bucket>` and hold a
//! JSON array of key-value pairs. Output files are named
//! `mapreduce-out-<bucket>` and hold `key value` lines. Names depend only on
//! task id and bucket, so re-running a task rewrites the same files.

use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::task::{ReduceInput, TaskId};
use crate::KeyValue;

const FILE_PREFIX: &str = "mapreduce-";

/// Name of the file map task `map_task` writes for `bucket`.
pub fn intermediate_name(map_task: TaskId, bucket: u32) -> String {
    format!("{FILE_PREFIX}{map_task}-{bucket}")
}

/// Name of the file the reduce task for `bucket` writes.
pub fn output_name(bucket: u32) -> String {
    format!("{FILE_PREFIX}out-{bucket}")
}

/// Parses an intermediate file name back into `(map task, bucket)`.
pub fn parse_intermediate_name(name: &str) -> Option<(TaskId, u32)> {
    let rest = name.strip_prefix(FILE_PREFIX)?;
    let (map_task, bucket) = rest.split_once('-')?;
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(map_task) || !all_digits(bucket) {
        return None;
    }
    Some((map_task.parse().ok()?, bucket.parse().ok()?))
}

pub fn encode_pairs(pairs: &[KeyValue]) -> Result<Vec<u8>> {
    serde_json::to_vec(pairs).context("failed to encode intermediate pairs")
}

pub fn decode_pairs(bytes: &[u8]) -> Result<Vec<KeyValue>> {
    serde_json::from_slice(bytes).context("failed to decode intermediate pairs")
}

/// Renders reduce results as `key value` lines.
pub fn format_output(pairs: &[KeyValue]) -> String {
    let mut out = String::new();
    for kv in pairs {
        // writing to a String cannot fail
        let _ = writeln!(out, "{} {}", kv.key, kv.value);
    }
    out
}

/// Parses `key value` lines. The key ends at the first space.
pub fn parse_output(text: &str) -> Vec<KeyValue> {
    text.lines()
        .filter(|line| !line.is_empty())
        .map(|line| match line.split_once(' ') {
            Some((key, value)) => KeyValue::new(key, value),
            None => KeyValue::new(line, ""),
        })
        .collect()
}

/// Scans `dir` for the intermediate files of every bucket in `0..n_reduce`.
///
/// Only files written by one of `map_tasks` count; anything else is left
/// over from another job. Files of each bucket are listed in map task
/// order, and every bucket gets an entry even when no file matched.
pub fn discover_reduce_inputs(
    dir: &Path,
    n_reduce: u32,
    map_tasks: &[TaskId],
) -> Result<Vec<ReduceInput>> {
    let known: HashSet<TaskId> = map_tasks.iter().copied().collect();
    let mut by_bucket: BTreeMap<u32, BTreeMap<TaskId, String>> =
        (0..n_reduce).map(|bucket| (bucket, BTreeMap::new())).collect();

    let entries = fs::read_dir(dir)
        .with_context(|| format!("failed to scan work directory {}", dir.display()))?;
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        let Some((map_task, bucket)) = parse_intermediate_name(&name) else {
            continue;
        };
        if !known.contains(&map_task) {
            continue;
        }
        if let Some(files) = by_bucket.get_mut(&bucket) {
            files.insert(map_task, name);
        }
    }

    Ok(by_bucket
        .into_iter()
        .map(|(bucket, files)| ReduceInput {
            bucket,
            files: files.into_values().collect(),
        })
        .collect())
}

/// Deletes intermediate files in `dir` that carry the id of one of
/// `map_tasks`. A map task only writes its non-empty buckets, so a file
/// left by an earlier run under the same id would otherwise be read as
/// this job's output. Returns how many files were removed.
pub fn remove_stale_intermediates(dir: &Path, map_tasks: &[TaskId]) -> Result<usize> {
    let known: HashSet<TaskId> = map_tasks.iter().copied().collect();
    let mut removed = 0;
    let entries = fs::read_dir(dir)
        .with_context(|| format!("failed to scan work directory {}", dir.display()))?;
    for entry in entries {
        let entry = entry?;
        let stale = entry
            .file_name()
            .to_str()
            .and_then(parse_intermediate_name)
            .is_some_and(|(map_task, _)| known.contains(&map_task));
        if stale && entry.file_type()?.is_file() {
            fs::remove_file(entry.path())
                .with_context(|| format!("failed to remove {}", entry.path().display()))?;
            removed += 1;
        }
    }
    Ok(removed)
}
