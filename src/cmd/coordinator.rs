use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::coordinator::{CoordinatorConfig, Leases, DEFAULT_CHUNK_SIZE, DEFAULT_N_REDUCE};
use crate::rpc::{Endpoint, DEFAULT_SOCKET};
use crate::utils;

#[derive(Parser, Debug)]
#[command(version, about = "Splits a job into tasks and hands them to workers", long_about = None)]
pub struct Args {
    /// Input files; glob patterns are expanded
    #[clap(required = true)]
    pub inputs: Vec<String>,
    /// Number of reduce tasks
    #[clap(short = 'r', long, default_value_t = DEFAULT_N_REDUCE)]
    pub n_reduce: u32,
    /// Endpoint to listen on: a unix socket path or tcp://host:port
    #[clap(short, long, env = "MR_SOCKET", default_value = DEFAULT_SOCKET)]
    pub listen: Endpoint,
    /// Largest number of bytes one map task reads
    #[clap(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: u64,
    /// Milliseconds between polls; invalid values fall back to 500
    #[clap(long, env = "POLL_MS")]
    pub poll_ms: Option<String>,
    /// Polls a map task may stay assigned before it is handed out again
    #[clap(long, env = "MAP_LEASE_POLLS", default_value_t = Leases::default().map_polls)]
    pub map_lease_polls: u32,
    /// Polls a reduce task may stay assigned before it is handed out again
    #[clap(long, env = "REDUCE_LEASE_POLLS", default_value_t = Leases::default().reduce_polls)]
    pub reduce_lease_polls: u32,
    /// Directory shared with the workers
    #[clap(short, long, default_value = ".")]
    pub work_dir: PathBuf,
    /// How long to keep answering workers after the job is done
    #[clap(long, default_value_t = 1000)]
    pub grace_ms: u64,
}

impl Args {
    pub fn config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            n_reduce: self.n_reduce,
            chunk_size: self.chunk_size,
            poll_interval: utils::poll_interval(self.poll_ms.as_deref()),
            leases: Leases {
                map_polls: self.map_lease_polls,
                reduce_polls: self.reduce_lease_polls,
            },
            work_dir: self.work_dir.clone(),
        }
    }

    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}
