//! A pseudo-application that sometimes kills its worker and sometimes
//! stalls it, to exercise recovery from crashed and slow workers.
//!
//! Its results are deterministic, so a job that survives the crashes
//! produces the same output as a sequential run.

use crate::*;
use anyhow::Result;
use rand::Rng;
use std::time::Duration;

/// Exits the process about a third of the time and sleeps for up to ten
/// seconds about another third.
fn maybe_crash_or_sleep() {
    let mut rng = rand::thread_rng();
    let roll = rng.gen_range(0..1000);
    if roll < 330 {
        tracing::warn!("crash workload: exiting the worker on purpose");
        std::process::exit(1);
    } else if roll < 660 {
        let pause = Duration::from_millis(rng.gen_range(0..10_000));
        std::thread::sleep(pause);
    }
}

/// The fixed pairs both crash workloads emit for one split.
pub(crate) fn split_pairs(filename: &str, contents: &str, tag: &str) -> Vec<KeyValue> {
    vec![
        KeyValue::new("a", filename),
        KeyValue::new("b", filename.len().to_string()),
        KeyValue::new("c", contents.len().to_string()),
        KeyValue::new("d", tag),
    ]
}

/// Values sorted and joined with spaces.
pub(crate) fn join_sorted(values: Box<dyn Iterator<Item = String> + '_>) -> String {
    let mut values = values.collect::<Vec<_>>();
    values.sort();
    values.join(" ")
}

pub fn map(filename: String, contents: String) -> MapOutput {
    maybe_crash_or_sleep();
    Ok(Box::new(
        split_pairs(&filename, &contents, "abcdefgxyz").into_iter().map(Ok),
    ))
}

pub fn reduce(_key: &str, values: Box<dyn Iterator<Item = String> + '_>) -> Result<String> {
    maybe_crash_or_sleep();
    Ok(join_sorted(values))
}
