//! In-memory registry of map and reduce tasks.
//!
//! A [`TaskStore`] holds every task of one phase. Tasks are never removed:
//! they move `Unassigned -> Assigned -> Finished`, and the only way back is
//! a lease expiry (`Assigned -> Unassigned`). `Finished` is terminal.

use std::fmt;

/// Identity of a task. Map ids start at [`FIRST_MAP_TASK_ID`]; reduce ids
/// are the bucket index.
pub type TaskId = u32;

/// Identity of a worker, as it reports itself in every request.
pub type WorkerId = u32;

/// Id of the first map task of a job.
pub const FIRST_MAP_TASK_ID: TaskId = 1000;

/// The job-wide stage. Reduce tasks only exist once every map task is
/// finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Map,
    Reduce,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Map => write!(f, "map"),
            Phase::Reduce => write!(f, "reduce"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Unassigned,
    Assigned,
    Finished,
}

/// A byte range of one input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapSplit {
    pub file: String,
    pub offset: u64,
    pub length: u64,
}

/// Everything a reduce task consumes: its bucket and the intermediate
/// files that map tasks wrote into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReduceInput {
    pub bucket: u32,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Map(MapSplit),
    Reduce(ReduceInput),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub status: TaskStatus,
    pub payload: Payload,
    /// Number of polls this task has spent `Assigned`.
    pub lease: u32,
    /// The worker that claimed the task most recently.
    pub holder: Option<WorkerId>,
}

impl Task {
    pub fn map(id: TaskId, split: MapSplit) -> Self {
        Self {
            id,
            status: TaskStatus::Unassigned,
            payload: Payload::Map(split),
            lease: 0,
            holder: None,
        }
    }

    pub fn reduce(input: ReduceInput) -> Self {
        Self {
            id: input.bucket,
            status: TaskStatus::Unassigned,
            payload: Payload::Reduce(input),
            lease: 0,
            holder: None,
        }
    }

    pub fn phase(&self) -> Phase {
        match self.payload {
            Payload::Map(_) => Phase::Map,
            Payload::Reduce(_) => Phase::Reduce,
        }
    }
}

/// What a worker says happened to a task it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// How the store reacted to a completion report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// The task is now finished.
    Accepted,
    /// The failure was recorded; the task will be handed out again.
    Requeued,
    /// The task had already finished; nothing changed.
    Duplicate,
    /// No task with that id exists.
    UnknownTask,
}

/// A snapshot of how many tasks sit in each status.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counts {
    pub total: usize,
    pub unassigned: usize,
    pub assigned: usize,
    pub finished: usize,
}

/// The tasks of one phase, kept in ascending id order.
#[derive(Debug, Default, Clone)]
pub struct TaskStore {
    tasks: Vec<Task>,
}

impl TaskStore {
    pub fn new(mut tasks: Vec<Task>) -> Self {
        tasks.sort_by_key(|task| task.id);
        Self { tasks }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.position(id).map(|idx| &self.tasks[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub fn ids(&self) -> Vec<TaskId> {
        self.tasks.iter().map(|task| task.id).collect()
    }

    fn position(&self, id: TaskId) -> Option<usize> {
        self.tasks.binary_search_by_key(&id, |task| task.id).ok()
    }

    /// Hands the lowest-id unassigned task to `worker`, marking it
    /// assigned with a fresh lease. Returns `None` when nothing is waiting.
    pub fn claim_next(&mut self, worker: WorkerId) -> Option<Task> {
        let task = self
            .tasks
            .iter_mut()
            .find(|task| task.status == TaskStatus::Unassigned)?;
        task.status = TaskStatus::Assigned;
        task.lease = 0;
        task.holder = Some(worker);
        Some(task.clone())
    }

    /// Records `worker`'s report for task `id`.
    ///
    /// A finished task never changes again, so repeated or late reports are
    /// harmless. A success from a worker whose lease already expired still
    /// finishes the task: its files are as good as anyone else's. A failure
    /// only puts the task back when it comes from the worker currently
    /// holding it; anyone else's failure is acknowledged and dropped.
    pub fn report(&mut self, id: TaskId, worker: WorkerId, outcome: Outcome) -> Ack {
        let Some(idx) = self.position(id) else {
            return Ack::UnknownTask;
        };
        let task = &mut self.tasks[idx];
        match (task.status, outcome) {
            (TaskStatus::Finished, _) => Ack::Duplicate,
            (_, Outcome::Success) => {
                task.status = TaskStatus::Finished;
                Ack::Accepted
            }
            (TaskStatus::Assigned, Outcome::Failure) if task.holder == Some(worker) => {
                task.status = TaskStatus::Unassigned;
                task.lease = 0;
                Ack::Requeued
            }
            (_, Outcome::Failure) => Ack::Requeued,
        }
    }

    /// Ages every assigned task by one poll and demotes those whose lease
    /// now exceeds `threshold`. Returns the ids that were demoted.
    pub fn expire_leases(&mut self, threshold: u32) -> Vec<TaskId> {
        let mut expired = Vec::new();
        for task in self
            .tasks
            .iter_mut()
            .filter(|task| task.status == TaskStatus::Assigned)
        {
            task.lease += 1;
            if task.lease > threshold {
                task.status = TaskStatus::Unassigned;
                task.lease = 0;
                expired.push(task.id);
            }
        }
        expired
    }

    pub fn counts(&self) -> Counts {
        let mut counts = Counts {
            total: self.tasks.len(),
            ..Counts::default()
        };
        for task in &self.tasks {
            match task.status {
                TaskStatus::Unassigned => counts.unassigned += 1,
                TaskStatus::Assigned => counts.assigned += 1,
                TaskStatus::Finished => counts.finished += 1,
            }
        }
        counts
    }

    /// True when every task is finished (vacuously true when empty).
    pub fn is_complete(&self) -> bool {
        self.tasks
            .iter()
            .all(|task| task.status == TaskStatus::Finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(file: &str) -> MapSplit {
        MapSplit {
            file: file.to_string(),
            offset: 0,
            length: 10,
        }
    }

    fn store() -> TaskStore {
        TaskStore::new(vec![
            Task::map(1001, split("b.txt")),
            Task::map(1000, split("a.txt")),
            Task::map(1002, split("c.txt")),
        ])
    }

    #[test]
    fn claims_in_id_order() {
        let mut store = store();
        assert_eq!(store.claim_next(1).map(|t| t.id), Some(1000));
        assert_eq!(store.claim_next(1).map(|t| t.id), Some(1001));
        assert_eq!(store.claim_next(1).map(|t| t.id), Some(1002));
        assert_eq!(store.claim_next(1), None);
        assert_eq!(store.counts().assigned, 3);
    }

    #[test]
    fn success_finishes_and_repeats_are_duplicates() {
        let mut store = store();
        let task = store.claim_next(1).unwrap();
        assert_eq!(store.report(task.id, 1, Outcome::Success), Ack::Accepted);
        assert_eq!(store.report(task.id, 1, Outcome::Success), Ack::Duplicate);
        assert_eq!(store.report(task.id, 1, Outcome::Failure), Ack::Duplicate);
        assert_eq!(store.get(task.id).unwrap().status, TaskStatus::Finished);
    }

    #[test]
    fn failure_requeues() {
        let mut store = store();
        let task = store.claim_next(1).unwrap();
        assert_eq!(store.report(task.id, 1, Outcome::Failure), Ack::Requeued);
        assert_eq!(store.get(task.id).unwrap().status, TaskStatus::Unassigned);
        // the lowest id is handed out again
        assert_eq!(store.claim_next(1).map(|t| t.id), Some(task.id));
    }

    #[test]
    fn unknown_id_is_answered() {
        let mut store = store();
        assert_eq!(store.report(7, 1, Outcome::Success), Ack::UnknownTask);
        assert_eq!(store.counts().finished, 0);
    }

    #[test]
    fn lease_expires_after_threshold_polls() {
        let mut store = store();
        let task = store.claim_next(1).unwrap();
        for _ in 0..3 {
            assert!(store.expire_leases(3).is_empty());
        }
        assert_eq!(store.expire_leases(3), vec![task.id]);
        assert_eq!(store.get(task.id).unwrap().status, TaskStatus::Unassigned);
        assert_eq!(store.get(task.id).unwrap().lease, 0);
    }

    #[test]
    fn claiming_resets_the_lease() {
        let mut store = TaskStore::new(vec![Task::map(1000, split("a.txt"))]);
        store.claim_next(1).unwrap();
        store.expire_leases(5);
        store.expire_leases(5);
        assert_eq!(store.get(1000).unwrap().lease, 2);
        assert_eq!(store.report(1000, 1, Outcome::Failure), Ack::Requeued);
        store.claim_next(1).unwrap();
        assert_eq!(store.get(1000).unwrap().lease, 0);
    }

    #[test]
    fn late_success_after_expiry_still_finishes() {
        let mut store = TaskStore::new(vec![Task::map(1000, split("a.txt"))]);
        store.claim_next(1).unwrap();
        assert_eq!(store.expire_leases(0), vec![1000]);
        assert_eq!(store.report(1000, 1, Outcome::Success), Ack::Accepted);
        assert!(store.is_complete());
        assert_eq!(store.claim_next(1), None);
    }

    #[test]
    fn finished_tasks_do_not_age() {
        let mut store = TaskStore::new(vec![Task::map(1000, split("a.txt"))]);
        store.claim_next(1).unwrap();
        store.report(1000, 1, Outcome::Success);
        assert!(store.expire_leases(0).is_empty());
        assert_eq!(store.get(1000).unwrap().status, TaskStatus::Finished);
    }

    #[test]
    fn empty_store_is_complete() {
        assert!(TaskStore::default().is_complete());
        assert!(!store().is_complete());
    }

    #[test]
    fn reduce_tasks_use_bucket_as_id() {
        let task = Task::reduce(ReduceInput {
            bucket: 3,
            files: vec![],
        });
        assert_eq!(task.id, 3);
        assert_eq!(task.phase(), Phase::Reduce);
    }

    #[test]
    fn failure_from_a_replaced_worker_leaves_the_task_alone() {
        let mut store = TaskStore::new(vec![Task::map(1000, split("a.txt"))]);
        store.claim_next(1).unwrap();
        assert_eq!(store.expire_leases(0), vec![1000]);
        assert_eq!(store.claim_next(2).unwrap().id, 1000);

        // the first worker gives up after its task went to the second one
        assert_eq!(store.report(1000, 1, Outcome::Failure), Ack::Requeued);
        let task = store.get(1000).unwrap();
        assert_eq!(task.status, TaskStatus::Assigned);
        assert_eq!(task.holder, Some(2));
        assert_eq!(store.claim_next(3), None);

        assert_eq!(store.report(1000, 2, Outcome::Success), Ack::Accepted);
        assert!(store.is_complete());
    }

    #[test]
    fn failure_after_expiry_does_not_double_queue() {
        let mut store = TaskStore::new(vec![Task::map(1000, split("a.txt"))]);
        store.claim_next(1).unwrap();
        store.expire_leases(0);
        assert_eq!(store.report(1000, 1, Outcome::Failure), Ack::Requeued);
        assert_eq!(store.get(1000).unwrap().status, TaskStatus::Unassigned);
        assert_eq!(store.claim_next(2).unwrap().holder, Some(2));
    }
}
