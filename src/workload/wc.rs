//! A MapReduce-compatible implementation of word count.
//!

use crate::*;
use anyhow::{Context, Result};

pub fn map(_filename: String, contents: String) -> MapOutput {
    let words = contents
        .split(|c: char| !c.is_alphabetic())
        .filter(|s| !s.is_empty())
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>();

    let iter = words
        .into_iter()
        .map(|word| Ok(KeyValue::new(word, "1")));
    Ok(Box::new(iter))
}

pub fn reduce(key: &str, values: Box<dyn Iterator<Item = String> + '_>) -> Result<String> {
    let mut count: u64 = 0;
    for value in values {
        count += value
            .parse::<u64>()
            .with_context(|| format!("bad count {value:?} for word {key:?}"))?;
    }
    Ok(count.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_splits_on_non_letters_and_lowercases() {
        let pairs = map("f".into(), "The cat's hat, the END.\n".into())
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        let words: Vec<_> = pairs.iter().map(|kv| kv.key()).collect();
        assert_eq!(words, vec!["the", "cat", "s", "hat", "the", "end"]);
        assert!(pairs.iter().all(|kv| kv.value == "1"));
    }

    #[test]
    fn reduce_sums_counts() {
        let values = vec!["1".to_string(), "1".to_string(), "3".to_string()];
        assert_eq!(reduce("the", Box::new(values.into_iter())).unwrap(), "5");
        let bad = vec!["x".to_string()];
        assert!(reduce("the", Box::new(bad.into_iter())).is_err());
    }
}
