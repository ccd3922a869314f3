//! A fault-tolerant MapReduce engine with lease-based task reassignment.
//!
//! A coordinator splits a job into map and reduce tasks and hands them out
//! to any number of worker processes over gRPC. Workers exchange data only
//! through a shared directory: intermediate and output files are named
//! deterministically and written by atomic rename, so a task that runs twice
//! (a straggler and its replacement) produces the same files.

use serde::{Deserialize, Serialize};
use std::hash::Hasher;

pub mod cmd;
pub mod codec;
pub mod coordinator;
pub mod rpc;
pub mod sequential;
pub mod task;
pub mod utils;
pub mod worker;
pub mod workload;

/////////////////////////////////////////////////////////////////////////////
// MapReduce application types
/////////////////////////////////////////////////////////////////////////////

/// The output of an application map function.
///
/// There are 2 layers of [`anyhow::Result`]s here. The outer layer
/// accounts for errors that arise while creating the iterator.
/// The inner layer accounts for errors that occur during iteration.
///
/// This accomodates both batch (all keys emitted at once) and lazy
/// (keys only emitted when the iterator is consumed) map operations.
pub type MapOutput = anyhow::Result<Box<dyn Iterator<Item = anyhow::Result<KeyValue>>>>;

/// A map function takes the name of the file a record came from and the
/// record itself, and returns an iterator that yields key-value pairs.
pub type MapFn = fn(filename: String, contents: String) -> MapOutput;

/// A reduce function takes in a key and an iterator over every value
/// emitted for that key. It returns the single output value.
pub type ReduceFn =
    fn(key: &str, values: Box<dyn Iterator<Item = String> + '_>) -> anyhow::Result<String>;

/// A map reduce application.
#[derive(Copy, Clone)]
pub struct Workload {
    pub map_fn: MapFn,
    pub reduce_fn: ReduceFn,
}

/////////////////////////////////////////////////////////////////////////////
// Key-value pairs
/////////////////////////////////////////////////////////////////////////////

/// A single key-value pair.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub struct KeyValue {
    /// The key.
    pub key: String,
    /// The value.
    pub value: String,
}

impl KeyValue {
    /// Construct a new key-value pair from the given key and value.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Borrow the key of this key-value pair.
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Consumes the key-value pair and returns the value.
    #[inline]
    pub fn into_value(self) -> String {
        self.value
    }
}

/////////////////////////////////////////////////////////////////////////////
// Partitioning
/////////////////////////////////////////////////////////////////////////////

/// Hashes an intermediate key with FNV-1a, masked to a non-negative
/// 31-bit range so it survives any signed representation.
pub fn ihash(key: &str) -> u32 {
    let mut hasher = fnv::FnvHasher::default();
    hasher.write(key.as_bytes());
    (hasher.finish() & 0x7fff_ffff) as u32
}

/// Compute the reduce bucket for a given key: `ihash(key) % n_reduce`.
///
/// `n_reduce` must be at least 1.
#[inline]
pub fn bucket_for(key: &str, n_reduce: u32) -> u32 {
    ihash(key) % n_reduce
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ihash_matches_fnv1a() {
        assert_eq!(ihash(""), 0x0422_2325);
        assert_eq!(ihash("a"), 0x0601_ec8c);
        assert_eq!(ihash("foobar"), 0x7739_67e8);
    }

    #[test]
    fn bucket_is_stable_and_in_range() {
        for n_reduce in 1..=7 {
            for word in ["the", "quick", "brown", "fox", "", "ünïcödé"] {
                let bucket = bucket_for(word, n_reduce);
                assert!(bucket < n_reduce);
                assert_eq!(bucket, bucket_for(word, n_reduce));
            }
        }
    }

    #[test]
    fn single_bucket_takes_everything() {
        assert_eq!(bucket_for("anything", 1), 0);
        assert_eq!(bucket_for("else", 1), 0);
    }
}
