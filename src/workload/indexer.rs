//! An inverted index: for every word, the documents it appears in.
//!

use crate::*;
use anyhow::Result;
use itertools::Itertools;
use std::collections::BTreeSet;

pub fn map(filename: String, contents: String) -> MapOutput {
    let words = contents
        .split(|c: char| !c.is_alphabetic())
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect::<BTreeSet<_>>();

    let iter = words
        .into_iter()
        .map(move |word| Ok(KeyValue::new(word, filename.clone())));
    Ok(Box::new(iter))
}

/// `<number of documents> <doc>,<doc>,...` with the documents sorted. A
/// file cut into several splits is listed once.
pub fn reduce(_key: &str, values: Box<dyn Iterator<Item = String> + '_>) -> Result<String> {
    let docs = values.collect::<BTreeSet<_>>();
    Ok(format!("{} {}", docs.len(), docs.iter().join(",")))
}
