//! The MapReduce coordinator.
//!
//! Owns the job state, serves the worker RPCs and drives the phase state
//! machine from a polling loop. Only the polling loop touches the file
//! system, and only once: when the map barrier is crossed and the reduce
//! inputs are collected.

use anyhow::{anyhow, bail, Context, Result};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::codec;
use crate::rpc::Endpoint;
use crate::task::{Counts, MapSplit, Phase, Task, FIRST_MAP_TASK_ID};
use crate::utils;

pub mod service;
pub mod state;

pub use service::{CoordinatorService, ServerHandle};
pub use state::{JobState, Leases, Progress};

/// Default size of one map split.
pub const DEFAULT_CHUNK_SIZE: u64 = 64 * 1024 * 1024;

/// Default number of reduce tasks.
pub const DEFAULT_N_REDUCE: u32 = 5;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Number of reduce tasks (`R`).
    pub n_reduce: u32,
    /// Largest byte range a single map task covers.
    pub chunk_size: u64,
    /// How often leases age and phase completion is checked.
    pub poll_interval: Duration,
    pub leases: Leases,
    /// Directory the workers write intermediate and output files to.
    pub work_dir: PathBuf,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            n_reduce: DEFAULT_N_REDUCE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            poll_interval: utils::DEFAULT_POLL,
            leases: Leases::default(),
            work_dir: PathBuf::from("."),
        }
    }
}

/// A snapshot of the job for operators and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobStatus {
    pub phase: Phase,
    pub counts: Counts,
    pub done: bool,
}

#[derive(Clone)]
pub struct Coordinator {
    state: Arc<Mutex<JobState>>,
    config: Arc<CoordinatorConfig>,
}

impl Coordinator {
    /// Splits `inputs` into map tasks. Unreadable inputs are an error.
    pub fn new(inputs: &[String], config: CoordinatorConfig) -> Result<Self> {
        if config.n_reduce == 0 {
            bail!("the number of reduce tasks must be at least 1");
        }
        let files = utils::expand_inputs(inputs)?;
        let splits = split_inputs(&files, config.chunk_size)?;
        let tasks = splits
            .into_iter()
            .zip(FIRST_MAP_TASK_ID..)
            .map(|(split, id)| Task::map(id, split))
            .collect::<Vec<_>>();

        fs::create_dir_all(&config.work_dir).with_context(|| {
            format!("failed to create work directory {}", config.work_dir.display())
        })?;
        let ids: Vec<_> = tasks.iter().map(|task| task.id).collect();
        let removed = codec::remove_stale_intermediates(&config.work_dir, &ids)?;
        if removed > 0 {
            warn!("removed {} stale intermediate files", removed);
        }
        info!(
            "coordinator ready: {} map tasks over {} files, {} reduce tasks",
            tasks.len(),
            files.len(),
            config.n_reduce
        );
        Ok(Self {
            state: Arc::new(Mutex::new(JobState::new(tasks, config.n_reduce))),
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    fn lock(&self) -> Result<MutexGuard<'_, JobState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("coordinator state is poisoned"))
    }

    pub fn status(&self) -> Result<JobStatus> {
        let state = self.lock()?;
        Ok(JobStatus {
            phase: state.phase(),
            counts: state.counts(),
            done: state.is_done(),
        })
    }

    /// The RPC service, sharing this coordinator's state.
    pub fn service(&self) -> CoordinatorService {
        CoordinatorService::new(Arc::clone(&self.state))
    }

    /// Starts serving RPCs on `endpoint`.
    pub async fn serve(&self, endpoint: &Endpoint) -> Result<ServerHandle> {
        service::serve(self.service(), endpoint).await
    }

    /// Runs the polling loop until every reduce task is finished.
    pub async fn run(&self) -> Result<()> {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if self.poll_once().await? {
                return Ok(());
            }
        }
    }

    /// One poll. Returns `true` once the job is complete.
    pub async fn poll_once(&self) -> Result<bool> {
        let progress = self.lock()?.poll(&self.config.leases);
        match progress {
            Progress::Running {
                phase,
                counts,
                expired,
            } => {
                for id in expired {
                    warn!("{} task {} lease expired, reassigning", phase, id);
                }
                info!(
                    "{} phase: {} total, {} finished, {} assigned",
                    phase, counts.total, counts.finished, counts.assigned
                );
                Ok(false)
            }
            Progress::MapComplete => {
                info!("map tasks are complete, creating reduce tasks");
                self.begin_reduce().await?;
                Ok(false)
            }
            Progress::Done => {
                info!("reduce tasks are complete");
                Ok(true)
            }
        }
    }

    async fn begin_reduce(&self) -> Result<()> {
        let map_ids = self.lock()?.map_task_ids();
        let dir = self.config.work_dir.clone();
        let n_reduce = self.config.n_reduce;
        // every map task is finished, so the directory no longer changes
        let inputs = tokio::task::spawn_blocking(move || {
            codec::discover_reduce_inputs(&dir, n_reduce, &map_ids)
        })
        .await
        .context("intermediate file scan panicked")??;
        for input in &inputs {
            info!(
                "reduce task {} reads {} intermediate files",
                input.bucket,
                input.files.len()
            );
        }
        self.lock()?.begin_reduce(inputs)?;
        Ok(())
    }
}

/// Cuts every file into consecutive splits of at most `chunk_size` bytes.
/// Empty files produce no split.
pub fn split_inputs(files: &[String], chunk_size: u64) -> Result<Vec<MapSplit>> {
    if chunk_size == 0 {
        bail!("chunk size must be positive");
    }
    let mut splits = Vec::new();
    for file in files {
        let meta = fs::metadata(file).with_context(|| format!("cannot access input file {file}"))?;
        if !meta.is_file() {
            bail!("input {file} is not a regular file");
        }
        let size = meta.len();
        let mut offset = 0;
        while offset < size {
            let length = chunk_size.min(size - offset);
            splits.push(MapSplit {
                file: file.clone(),
                offset,
                length,
            });
            offset += length;
        }
    }
    Ok(splits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Outcome;

    fn write_input(dir: &std::path::Path, name: &str, contents: &str) -> String {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn splits_cover_each_file_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_input(dir.path(), "a.txt", "0123456789");
        let b = write_input(dir.path(), "b.txt", "abc");
        let empty = write_input(dir.path(), "empty.txt", "");
        let splits = split_inputs(&[a.clone(), empty, b.clone()], 4).unwrap();
        let ranges: Vec<_> = splits
            .iter()
            .map(|s| (s.file.as_str(), s.offset, s.length))
            .collect();
        assert_eq!(
            ranges,
            vec![
                (a.as_str(), 0, 4),
                (a.as_str(), 4, 4),
                (a.as_str(), 8, 2),
                (b.as_str(), 0, 3),
            ]
        );
    }

    #[test]
    fn missing_input_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.txt").to_string_lossy().into_owned();
        assert!(Coordinator::new(&[missing], CoordinatorConfig::default()).is_err());
    }

    #[test]
    fn zero_reduce_tasks_is_rejected() {
        let config = CoordinatorConfig {
            n_reduce: 0,
            ..CoordinatorConfig::default()
        };
        assert!(Coordinator::new(&[], config).is_err());
    }

    #[test]
    fn leftovers_from_an_earlier_run_are_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_input(dir.path(), "a.txt", "hello\n");
        let stale = dir.path().join(codec::intermediate_name(1000, 3));
        fs::write(&stale, b"[]").unwrap();
        let config = CoordinatorConfig {
            work_dir: dir.path().to_path_buf(),
            ..CoordinatorConfig::default()
        };
        Coordinator::new(&[a], config).unwrap();
        assert!(!stale.exists());
    }

    #[test]
    fn map_ids_start_at_one_thousand() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_input(dir.path(), "a.txt", "hello world\n");
        let b = write_input(dir.path(), "b.txt", "bye\n");
        let config = CoordinatorConfig {
            work_dir: dir.path().to_path_buf(),
            ..CoordinatorConfig::default()
        };
        let coordinator = Coordinator::new(&[a, b], config).unwrap();
        let mut state = coordinator.lock().unwrap();
        assert_eq!(state.map_task_ids(), vec![1000, 1001]);
        assert_eq!(state.assign(1).unwrap().id, 1000);
    }

    #[tokio::test]
    async fn polling_crosses_the_barrier_with_discovered_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_input(dir.path(), "a.txt", "x y\n");
        let config = CoordinatorConfig {
            n_reduce: 2,
            work_dir: dir.path().to_path_buf(),
            ..CoordinatorConfig::default()
        };
        let coordinator = Coordinator::new(&[a], config).unwrap();
        {
            let mut state = coordinator.lock().unwrap();
            let task = state.assign(1).unwrap();
            state.report(task.id, Phase::Map, 1, Outcome::Success);
        }
        fs::write(dir.path().join(codec::intermediate_name(1000, 1)), b"[]").unwrap();

        assert!(!coordinator.poll_once().await.unwrap());
        let status = coordinator.status().unwrap();
        assert_eq!(status.phase, Phase::Reduce);
        assert_eq!(status.counts.total, 2);

        let mut state = coordinator.lock().unwrap();
        let first = state.assign(1).unwrap();
        let second = state.assign(1).unwrap();
        assert_eq!((first.id, second.id), (0, 1));
        match &second.payload {
            crate::task::Payload::Reduce(input) => {
                assert_eq!(input.files, vec!["mapreduce-1000-1".to_string()])
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_job_finishes_with_empty_reduce_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoordinatorConfig {
            n_reduce: 2,
            work_dir: dir.path().to_path_buf(),
            ..CoordinatorConfig::default()
        };
        let coordinator = Coordinator::new(&[], config).unwrap();
        assert!(!coordinator.poll_once().await.unwrap());
        assert_eq!(coordinator.status().unwrap().phase, Phase::Reduce);
        {
            let mut state = coordinator.lock().unwrap();
            while let Some(task) = state.assign(1) {
                state.report(task.id, Phase::Reduce, 1, Outcome::Success);
            }
        }
        assert!(coordinator.poll_once().await.unwrap());
        assert!(coordinator.status().unwrap().done);
    }
}
