#![allow(dead_code)]

use mrlease::codec;
use mrlease::coordinator::{Coordinator, CoordinatorConfig, Leases, ServerHandle};
use mrlease::rpc::Endpoint;
use mrlease::worker::{Worker, WorkerConfig, WorkerSummary};
use mrlease::{workload, KeyValue};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tokio::task::JoinHandle;

pub const JOB_TIMEOUT: Duration = Duration::from_secs(30);

const TEXTS: &[(&str, &str)] = &[
    (
        "pg-being_ernest.txt",
        "The truth is rarely pure and never simple.\nModern life would be very tedious if it were either,\nand modern literature a complete impossibility!\n",
    ),
    (
        "pg-frankenstein.txt",
        "Beware; for I am fearless, and therefore powerful.\nNothing is so painful to the human mind as a great and sudden change.\n",
    ),
    (
        "pg-metamorphosis.txt",
        "One morning, when Gregor Samsa woke from troubled dreams,\nhe found himself transformed in his bed into a horrible vermin.\nThe bed was warm. The morning was grey.",
    ),
];

/// Writes a few small text files into `dir` and returns their paths.
pub fn write_inputs(dir: &Path) -> Vec<String> {
    TEXTS
        .iter()
        .map(|(name, text)| {
            let path = dir.join(name);
            fs::write(&path, text).unwrap();
            path.display().to_string()
        })
        .collect()
}

pub fn socket(dir: &Path) -> Endpoint {
    Endpoint::Unix(dir.join("socket").join("mr.sock"))
}

/// A coordinator that polls quickly and cuts inputs into many small splits.
pub fn fast_config(dir: &Path, n_reduce: u32) -> CoordinatorConfig {
    CoordinatorConfig {
        n_reduce,
        chunk_size: 48,
        poll_interval: Duration::from_millis(20),
        leases: Leases::default(),
        work_dir: dir.to_path_buf(),
    }
}

pub fn fast_worker(dir: &Path) -> WorkerConfig {
    WorkerConfig {
        work_dir: dir.to_path_buf(),
        backoff: Duration::from_millis(10),
        connect_attempts: 3,
    }
}

pub async fn start(
    inputs: &[String],
    config: CoordinatorConfig,
    endpoint: &Endpoint,
) -> (Coordinator, ServerHandle) {
    let coordinator = Coordinator::new(inputs, config).unwrap();
    let server = coordinator.serve(endpoint).await.unwrap();
    (coordinator, server)
}

pub fn spawn_workers(
    job: &str,
    n: u32,
    dir: &Path,
    endpoint: &Endpoint,
) -> Vec<JoinHandle<anyhow::Result<WorkerSummary>>> {
    (0..n)
        .map(|id| {
            let worker = Worker::new(id, workload::named(job).unwrap(), fast_worker(dir));
            let endpoint = endpoint.clone();
            tokio::spawn(async move { worker.run(&endpoint).await })
        })
        .collect()
}

/// Runs the polling loop to completion.
pub async fn finish(coordinator: &Coordinator) {
    tokio::time::timeout(JOB_TIMEOUT, coordinator.run())
        .await
        .expect("job did not finish in time")
        .unwrap();
}

/// Waits for every worker to notice the coordinator is gone.
pub async fn join_workers(
    workers: Vec<JoinHandle<anyhow::Result<WorkerSummary>>>,
) -> Vec<WorkerSummary> {
    let mut summaries = Vec::new();
    for worker in workers {
        let summary = tokio::time::timeout(JOB_TIMEOUT, worker)
            .await
            .expect("worker did not exit")
            .unwrap()
            .unwrap();
        summaries.push(summary);
    }
    summaries
}

/// Reads every `mapreduce-out-*` file of the job, each of which must
/// exist, and returns all lines sorted by key.
pub fn read_outputs(dir: &Path, n_reduce: u32) -> Vec<KeyValue> {
    let mut pairs = Vec::new();
    for bucket in 0..n_reduce {
        let text = fs::read_to_string(dir.join(codec::output_name(bucket))).unwrap();
        pairs.extend(codec::parse_output(&text));
    }
    pairs.sort_by(|a, b| a.key.cmp(&b.key));
    pairs
}
