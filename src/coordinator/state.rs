//! The coordinator's single owned aggregate: both task stores plus the
//! phase flag. Every RPC handler and every poll works on it under one lock.

use anyhow::{bail, Result};

use crate::task::{Ack, Counts, Outcome, Phase, ReduceInput, Task, TaskId, TaskStore, WorkerId};

/// Lease thresholds, in polls, for each phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Leases {
    pub map_polls: u32,
    pub reduce_polls: u32,
}

impl Default for Leases {
    fn default() -> Self {
        Self {
            map_polls: 12,
            reduce_polls: 4,
        }
    }
}

/// What one poll found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// The active phase still has work outstanding.
    Running {
        phase: Phase,
        counts: Counts,
        expired: Vec<TaskId>,
    },
    /// Every map task is finished; reduce tasks can be built.
    MapComplete,
    /// Every reduce task is finished.
    Done,
}

#[derive(Debug)]
pub struct JobState {
    phase: Phase,
    n_reduce: u32,
    map_tasks: TaskStore,
    reduce_tasks: TaskStore,
    done: bool,
}

impl JobState {
    pub fn new(map_tasks: Vec<Task>, n_reduce: u32) -> Self {
        Self {
            phase: Phase::Map,
            n_reduce,
            map_tasks: TaskStore::new(map_tasks),
            reduce_tasks: TaskStore::default(),
            done: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn n_reduce(&self) -> u32 {
        self.n_reduce
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn map_task_ids(&self) -> Vec<TaskId> {
        self.map_tasks.ids()
    }

    fn active(&self) -> &TaskStore {
        match self.phase {
            Phase::Map => &self.map_tasks,
            Phase::Reduce => &self.reduce_tasks,
        }
    }

    fn active_mut(&mut self) -> &mut TaskStore {
        match self.phase {
            Phase::Map => &mut self.map_tasks,
            Phase::Reduce => &mut self.reduce_tasks,
        }
    }

    /// Counts of the active phase.
    pub fn counts(&self) -> Counts {
        self.active().counts()
    }

    pub fn task(&self, phase: Phase, id: TaskId) -> Option<&Task> {
        match phase {
            Phase::Map => self.map_tasks.get(id),
            Phase::Reduce => self.reduce_tasks.get(id),
        }
    }

    /// Hands the next unassigned task of the active phase to `worker`, or
    /// returns `None` when every task is assigned or finished.
    pub fn assign(&mut self, worker: WorkerId) -> Option<Task> {
        if self.done {
            return None;
        }
        self.active_mut().claim_next(worker)
    }

    /// Records a completion report for task `id` of `phase`. Reports for a
    /// phase other than the active one still land on that phase's store:
    /// a late map report during the reduce phase finds a finished task and
    /// is acknowledged as a duplicate.
    pub fn report(&mut self, id: TaskId, phase: Phase, worker: WorkerId, outcome: Outcome) -> Ack {
        match phase {
            Phase::Map => self.map_tasks.report(id, worker, outcome),
            Phase::Reduce => self.reduce_tasks.report(id, worker, outcome),
        }
    }

    /// One tick of the coordinator's polling loop: age leases, demote
    /// expired tasks and decide whether the active phase is complete.
    ///
    /// Does not change phase; see [`JobState::begin_reduce`].
    pub fn poll(&mut self, leases: &Leases) -> Progress {
        if self.done {
            return Progress::Done;
        }
        let (phase, threshold) = match self.phase {
            Phase::Map => (Phase::Map, leases.map_polls),
            Phase::Reduce => (Phase::Reduce, leases.reduce_polls),
        };
        let expired = self.active_mut().expire_leases(threshold);
        if self.active().is_complete() {
            return match phase {
                Phase::Map => Progress::MapComplete,
                Phase::Reduce => {
                    self.done = true;
                    Progress::Done
                }
            };
        }
        Progress::Running {
            phase,
            counts: self.counts(),
            expired,
        }
    }

    /// Crosses the map barrier: installs one reduce task per bucket and
    /// switches to the reduce phase.
    ///
    /// Fails unless the job is in the map phase with every map task
    /// finished, and unless `inputs` covers exactly the buckets
    /// `0..n_reduce`.
    pub fn begin_reduce(&mut self, inputs: Vec<ReduceInput>) -> Result<()> {
        if self.phase != Phase::Map {
            bail!("reduce phase already started");
        }
        if !self.map_tasks.is_complete() {
            bail!("map phase is not complete");
        }
        let mut buckets: Vec<u32> = inputs.iter().map(|input| input.bucket).collect();
        buckets.sort_unstable();
        if buckets != (0..self.n_reduce).collect::<Vec<_>>() {
            bail!(
                "expected reduce inputs for buckets 0..{}, got {:?}",
                self.n_reduce,
                buckets
            );
        }
        self.reduce_tasks = TaskStore::new(inputs.into_iter().map(Task::reduce).collect());
        self.phase = Phase::Reduce;
        Ok(())
    }
}
