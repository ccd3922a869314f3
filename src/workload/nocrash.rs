//! The crash workload without the crashes. Running it sequentially gives
//! the reference output for a `crash` job over the same inputs, apart from
//! the `d` key.

use super::crash::{join_sorted, split_pairs};
use crate::*;
use anyhow::Result;

pub fn map(filename: String, contents: String) -> MapOutput {
    Ok(Box::new(
        split_pairs(&filename, &contents, "abcdefg").into_iter().map(Ok),
    ))
}

pub fn reduce(_key: &str, values: Box<dyn Iterator<Item = String> + '_>) -> Result<String> {
    Ok(join_sorted(values))
}
