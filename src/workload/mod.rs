//! Converts MapReduce application names to actual application code.
//!
//! # Example
//!
//! To get the word count application:
//! ```
//! # use anyhow::Result;
//! use mrlease::workload;
//! # fn main() -> Result<()> {
//! let wc = workload::named("wc")?;
//! # Ok(())
//! # }
//! ```

use crate::Workload;
use anyhow::{bail, Result};

pub mod crash;
pub mod indexer;
pub mod jobcount;
pub mod nocrash;
pub mod rtiming;
pub mod wc;

/// Every registered application name.
pub const NAMES: &[&str] = &["wc", "indexer", "crash", "nocrash", "jobcount", "rtiming"];

/// Gets the [`Workload`] named `name`.
///
/// Returns [`None`] if no application with the given name was found.
pub fn try_named(name: &str) -> Option<Workload> {
    match name {
        "wc" => Some(Workload {
            map_fn: wc::map,
            reduce_fn: wc::reduce,
        }),
        "indexer" => Some(Workload {
            map_fn: indexer::map,
            reduce_fn: indexer::reduce,
        }),
        "crash" => Some(Workload {
            map_fn: crash::map,
            reduce_fn: crash::reduce,
        }),
        "nocrash" => Some(Workload {
            map_fn: nocrash::map,
            reduce_fn: nocrash::reduce,
        }),
        "jobcount" => Some(Workload {
            map_fn: jobcount::map,
            reduce_fn: jobcount::reduce,
        }),
        "rtiming" => Some(Workload {
            map_fn: rtiming::map,
            reduce_fn: rtiming::reduce,
        }),
        _ => None,
    }
}

/// Gets the [`Workload`] named `name`.
///
/// Returns an [`anyhow::Error`] if no application with the given name was found.
pub fn named(name: &str) -> Result<Workload> {
    match try_named(name) {
        Some(app) => Ok(app),
        None => bail!(
            "No app named `{}` found. Known apps: {}.",
            name,
            NAMES.join(", ")
        ),
    }
}
