//! The MapReduce worker.
//!
//! A worker asks the coordinator for a task, runs it, reports the outcome
//! and asks again. It never talks to other workers: map output reaches the
//! reducers through deterministically named files in the work directory.

use anyhow::{anyhow, Context, Result};
use itertools::Itertools;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::rpc::proto::{AssignTaskRequest, ReportDoneRequest};
use crate::rpc::{self, Assignment, CoordinatorClient, Endpoint};
use crate::task::{Ack, MapSplit, Outcome, Phase, ReduceInput, TaskId};
use crate::{bucket_for, codec, utils, KeyValue, Workload};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Directory intermediate and output files are written to.
    pub work_dir: PathBuf,
    /// Pause after a `NoTask` reply, and between dial attempts.
    pub backoff: Duration,
    /// How many times to dial before concluding the coordinator is gone.
    pub connect_attempts: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            backoff: Duration::from_millis(500),
            connect_attempts: 5,
        }
    }
}

/// What one worker got done before the coordinator went away.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSummary {
    pub map_tasks: usize,
    pub reduce_tasks: usize,
    pub failures: usize,
}

pub struct Worker {
    id: u32,
    workload: Workload,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(id: u32, workload: Workload, config: WorkerConfig) -> Self {
        Self {
            id,
            workload,
            config,
        }
    }

    /// Serves tasks from the coordinator at `endpoint` until it can no
    /// longer be reached. An unreachable coordinator is the normal way for
    /// a job to end, so it is not an error.
    pub async fn run(&self, endpoint: &Endpoint) -> Result<WorkerSummary> {
        let mut summary = WorkerSummary::default();
        let Some(mut client) = self.dial(endpoint).await else {
            return Ok(summary);
        };

        loop {
            let request = AssignTaskRequest { worker_id: self.id };
            let reply = match client.assign_task(request).await {
                Ok(reply) => reply.into_inner(),
                Err(status) => {
                    info!(
                        "worker {}: coordinator unreachable ({}), exiting",
                        self.id,
                        status.message()
                    );
                    return Ok(summary);
                }
            };

            let assignment = match Assignment::try_from(reply) {
                Ok(assignment) => assignment,
                Err(e) => {
                    warn!("worker {}: ignoring malformed assignment: {:#}", self.id, e);
                    sleep(self.config.backoff).await;
                    continue;
                }
            };

            let (phase, task_id, result) = match assignment {
                Assignment::NoTask => {
                    sleep(self.config.backoff).await;
                    continue;
                }
                Assignment::Map {
                    task_id,
                    split,
                    n_reduce,
                } => {
                    info!(
                        "worker {}: map task {} on {} [{}+{}]",
                        self.id, task_id, split.file, split.offset, split.length
                    );
                    let workload = self.workload;
                    let dir = self.config.work_dir.clone();
                    let result = run_blocking(move || {
                        execute_map(&workload, task_id, &split, n_reduce, &dir).map(|_| ())
                    })
                    .await;
                    (Phase::Map, task_id, result)
                }
                Assignment::Reduce { task_id, input } => {
                    info!(
                        "worker {}: reduce task {} over {} files",
                        self.id,
                        task_id,
                        input.files.len()
                    );
                    let workload = self.workload;
                    let dir = self.config.work_dir.clone();
                    let result =
                        run_blocking(move || execute_reduce(&workload, &input, &dir).map(|_| ()))
                            .await;
                    (Phase::Reduce, task_id, result)
                }
            };

            let outcome = match result {
                Ok(()) => {
                    match phase {
                        Phase::Map => summary.map_tasks += 1,
                        Phase::Reduce => summary.reduce_tasks += 1,
                    }
                    Outcome::Success
                }
                Err(e) => {
                    warn!("worker {}: {} task {} failed: {:#}", self.id, phase, task_id, e);
                    summary.failures += 1;
                    Outcome::Failure
                }
            };
            self.report(&mut client, task_id, phase, outcome).await;
        }
    }

    async fn dial(&self, endpoint: &Endpoint) -> Option<CoordinatorClient> {
        let attempts = self.config.connect_attempts.max(1);
        for attempt in 1..=attempts {
            match rpc::connect(endpoint).await {
                Ok(client) => return Some(client),
                Err(e) => {
                    debug!("dial attempt {}/{} failed: {:#}", attempt, attempts, e);
                    if attempt < attempts {
                        sleep(self.config.backoff).await;
                    }
                }
            }
        }
        info!(
            "worker {}: coordinator at {} unreachable, exiting",
            self.id, endpoint
        );
        None
    }

    async fn report(
        &self,
        client: &mut CoordinatorClient,
        task_id: TaskId,
        phase: Phase,
        outcome: Outcome,
    ) {
        let mut request = ReportDoneRequest {
            task_id,
            worker_id: self.id,
            ..Default::default()
        };
        request.set_phase(phase.into());
        request.set_outcome(outcome.into());
        match client.report_done(request).await {
            Ok(reply) => {
                let ack = Ack::from(reply.into_inner().status());
                debug!(
                    "worker {}: {} task {} reported {:?}: {:?}",
                    self.id, phase, task_id, outcome, ack
                );
            }
            // the next AssignTask decides whether the coordinator is gone
            Err(status) => warn!(
                "worker {}: failed to report {} task {}: {}",
                self.id,
                phase,
                task_id,
                status.message()
            ),
        }
    }
}

/// Runs task code on the blocking pool. A panic becomes an error so the
/// task is reported as failed instead of taking the worker down.
async fn run_blocking<F>(f: F) -> Result<()>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(anyhow!("task panicked")),
        Err(e) => Err(anyhow!(e)),
    }
}

/////////////////////////////////////////////////////////////////////////////
// Task execution
/////////////////////////////////////////////////////////////////////////////

/// Reads the lines owned by `split`: every line whose first byte lies in
/// `[offset, offset + length)`. The line straddling the start belongs to the
/// previous split; the line straddling the end is read to its newline.
pub fn read_split(split: &MapSplit) -> Result<String> {
    let mut file =
        File::open(&split.file).with_context(|| format!("cannot open {}", split.file))?;
    let end = split.offset + split.length;
    let mut pos = split.offset;

    if split.offset > 0 {
        file.seek(SeekFrom::Start(split.offset - 1))?;
    }
    let mut reader = BufReader::new(file);
    if split.offset > 0 {
        let mut prev = [0u8; 1];
        reader.read_exact(&mut prev)?;
        if prev[0] != b'\n' {
            let mut partial = Vec::new();
            pos += reader.read_until(b'\n', &mut partial)? as u64;
        }
    }

    let mut buf = Vec::new();
    while pos < end {
        let n = reader.read_until(b'\n', &mut buf)?;
        if n == 0 {
            break;
        }
        pos += n as u64;
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Runs the map function over `split` and writes one intermediate file per
/// non-empty bucket. Returns the files written.
pub fn execute_map(
    workload: &Workload,
    task_id: TaskId,
    split: &MapSplit,
    n_reduce: u32,
    work_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let contents = read_split(split)?;
    let mut buckets: Vec<Vec<KeyValue>> = vec![Vec::new(); n_reduce as usize];
    for item in (workload.map_fn)(split.file.clone(), contents)? {
        let kv = item?;
        buckets[bucket_for(&kv.key, n_reduce) as usize].push(kv);
    }

    let mut written = Vec::new();
    for (bucket, pairs) in buckets.iter().enumerate() {
        if pairs.is_empty() {
            continue;
        }
        let path = work_dir.join(codec::intermediate_name(task_id, bucket as u32));
        utils::write_atomically(&path, &codec::encode_pairs(pairs)?)?;
        written.push(path);
    }
    Ok(written)
}

/// Merges the intermediate files of one bucket, reduces every key and
/// writes the sorted output file. Returns its path.
///
/// A bucket nobody wrote to still gets an (empty) output file.
pub fn execute_reduce(workload: &Workload, input: &ReduceInput, work_dir: &Path) -> Result<PathBuf> {
    let mut pairs = Vec::new();
    for name in &input.files {
        let path = work_dir.join(name);
        let bytes = fs::read(&path).with_context(|| format!("cannot read {}", path.display()))?;
        pairs.extend(
            codec::decode_pairs(&bytes).with_context(|| format!("corrupt {}", path.display()))?,
        );
    }
    let reduced = reduce_sorted(workload, pairs)?;
    let path = work_dir.join(codec::output_name(input.bucket));
    utils::write_atomically(&path, codec::format_output(&reduced).as_bytes())?;
    Ok(path)
}

/// Sorts `pairs` by key, then calls the reduce function once per distinct
/// key with all of that key's values. The sort is stable, so values reach
/// the reduce function in the order they were collected.
pub fn reduce_sorted(workload: &Workload, mut pairs: Vec<KeyValue>) -> Result<Vec<KeyValue>> {
    pairs.sort_by(|a, b| a.key.cmp(&b.key));
    let mut out = Vec::new();
    for (key, group) in &pairs.into_iter().chunk_by(|kv| kv.key.clone()) {
        let value = (workload.reduce_fn)(&key, Box::new(group.map(KeyValue::into_value)))?;
        out.push(KeyValue { key, value });
    }
    Ok(out)
}
