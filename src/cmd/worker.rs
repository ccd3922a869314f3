use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::rpc::{Endpoint, DEFAULT_SOCKET};
use crate::worker::WorkerConfig;

#[derive(Parser, Debug)]
#[command(version, about = "Runs map and reduce tasks for a coordinator", long_about = None)]
pub struct Args {
    /// Name of the workload, e.g. wc or indexer
    pub job: String,
    /// Coordinator endpoint: a unix socket path or tcp://host:port
    #[clap(short, long, env = "MR_SOCKET", default_value = DEFAULT_SOCKET)]
    pub coordinator: Endpoint,
    /// Directory shared with the coordinator
    #[clap(short, long, default_value = ".")]
    pub work_dir: PathBuf,
    /// Milliseconds to wait when there is no task to run
    #[clap(long, default_value_t = 500)]
    pub backoff_ms: u64,
    /// Dial attempts before giving up on the coordinator
    #[clap(long, default_value_t = 5)]
    pub connect_attempts: u32,
}

impl Args {
    pub fn config(&self) -> WorkerConfig {
        WorkerConfig {
            work_dir: self.work_dir.clone(),
            backoff: Duration::from_millis(self.backoff_ms),
            connect_attempts: self.connect_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_job_and_endpoint() {
        let args =
            Args::try_parse_from(["mrl-worker", "wc", "-c", "/tmp/mr.sock", "--backoff-ms", "50"])
                .unwrap();
        assert_eq!(args.job, "wc");
        assert_eq!(args.coordinator, Endpoint::Unix("/tmp/mr.sock".into()));
        assert_eq!(args.config().backoff, Duration::from_millis(50));
        assert_eq!(args.config().connect_attempts, 5);
    }
}
