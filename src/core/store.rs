use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use super::job::UploadJob;
use super::types::{JobId, JobResult, JobSnapshot, JobState};

pub(crate) struct JobEntry {
    /// Released once the job is terminal; only the record stays.
    pub job: Option<Arc<UploadJob>>,
    pub key: String,
    pub cancel: CancellationToken,
    pub handle: Option<JoinHandle<()>>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<JobResult>,
    waiters: Vec<oneshot::Sender<JobResult>>,
}

/// Scheduler side record of every submitted job.
///
/// A key stays in `active_keys` from submission until the job is terminal.
#[derive(Default)]
pub(crate) struct JobStore {
    jobs: HashMap<JobId, JobEntry>,
    active_keys: HashMap<String, JobId>,
    pending_queue: VecDeque<JobId>,
    running: usize,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_job_for(&self, key: &str) -> Option<JobId> {
        self.active_keys.get(key).copied()
    }

    pub fn add_job(&mut self, job: UploadJob) -> JobId {
        let id = job.id();
        let key = job.dedup_key().to_string();
        self.active_keys.insert(key.clone(), id);
        self.jobs.insert(id, JobEntry {
            job: Some(Arc::new(job)),
            key,
            cancel: CancellationToken::new(),
            handle: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            waiters: Vec::new(),
        });
        self.pending_queue.push_back(id);
        id
    }

    pub fn running_count(&self) -> usize {
        self.running
    }

    pub fn next_pending(&mut self) -> Option<JobId> {
        self.pending_queue.pop_front()
    }

    pub fn get(&self, id: &JobId) -> Option<&JobEntry> {
        self.jobs.get(id)
    }

    pub fn mark_running(&mut self, id: &JobId, handle: JoinHandle<()>) {
        if let Some(entry) = self.jobs.get_mut(id) {
            entry.handle = Some(handle);
            entry.started_at = Some(Utc::now());
            self.running += 1;
        }
    }

    /// Records the result, releases the key and the job, then answers
    /// waiters.
    pub fn mark_finished(&mut self, id: &JobId, result: JobResult) {
        let Some(entry) = self.jobs.get_mut(id) else {
            return;
        };
        if entry.result.is_some() {
            return;
        }

        if entry.handle.take().is_some() {
            self.running = self.running.saturating_sub(1);
        }
        entry.job = None;
        entry.result = Some(result);
        entry.completed_at = Some(Utc::now());
        if self.active_keys.get(&entry.key) == Some(id) {
            self.active_keys.remove(&entry.key);
        }
        for waiter in entry.waiters.drain(..) {
            let _ = waiter.send(result);
        }
    }

    /// Removes a job that has not started yet from the queue.
    pub fn take_pending(&mut self, id: &JobId) -> Option<Arc<UploadJob>> {
        let position = self.pending_queue.iter().position(|queued| queued == id)?;
        self.pending_queue.remove(position);
        self.jobs.get(id).and_then(|entry| entry.job.clone())
    }

    pub fn pending_ids(&self) -> Vec<JobId> {
        self.pending_queue.iter().copied().collect()
    }

    pub fn is_running(&self, id: &JobId) -> bool {
        self.jobs
            .get(id)
            .map(|entry| entry.handle.is_some())
            .unwrap_or(false)
    }

    /// Cancels every running job and hands back their join handles.
    pub fn cancel_running(&mut self) -> Vec<(JobId, JoinHandle<()>)> {
        let mut handles = Vec::new();
        for (id, entry) in self.jobs.iter_mut() {
            if let Some(handle) = entry.handle.take() {
                entry.cancel.cancel();
                handles.push((*id, handle));
            }
        }
        self.running = 0;
        handles
    }

    /// Registers interest in a job's result. `false` if the job is unknown.
    pub fn add_waiter(&mut self, id: &JobId, waiter: oneshot::Sender<JobResult>) -> bool {
        match self.jobs.get_mut(id) {
            Some(entry) => {
                match entry.result {
                    Some(result) => {
                        let _ = waiter.send(result);
                    }
                    None => entry.waiters.push(waiter),
                }
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self, id: &JobId) -> Option<JobSnapshot> {
        self.jobs.get(id).map(|entry| {
            let state = match entry.result {
                Some(result) => JobState::from(result),
                None if entry.handle.is_some() => entry
                    .job
                    .as_ref()
                    .map(|job| job.state())
                    .unwrap_or(JobState::Pending),
                None => JobState::Pending,
            };
            JobSnapshot {
                id: *id,
                key: entry.key.clone(),
                state,
                created_at: entry.created_at,
                started_at: entry.started_at,
                completed_at: entry.completed_at,
                result: entry.result,
            }
        })
    }
}
