use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use super::errors::{Result, UploadError};
use super::job::UploadJob;
use super::types::{JobId, JobResult, JobSnapshot, SchedulerEvent, SubmitOutcome};
use super::worker::{SchedulerCommand, SchedulerWorker};

/// Runs upload jobs with at most one active job per dedup key.
#[async_trait]
pub trait JobScheduler: Send + Sync {
    /// Queues `job` unless a job with the same key is pending or running,
    /// in which case the submission is a no-op.
    async fn submit(&self, job: UploadJob) -> Result<SubmitOutcome>;

    /// Requests a stop. Returns `false` if the job is unknown or already done.
    async fn cancel(&self, id: JobId) -> Result<bool>;
}

/// Tokio backed [`JobScheduler`]
pub struct UploadScheduler {
    command_tx: mpsc::Sender<SchedulerCommand>,
    event_tx: broadcast::Sender<SchedulerEvent>,
    worker_handle: JoinHandle<()>,
}

impl UploadScheduler {
    /// Spawns the scheduler worker on the current runtime.
    pub fn new(max_concurrent: usize) -> Self {
        let (command_tx, command_rx) = mpsc::channel(64);
        let (event_tx, _) = broadcast::channel(256);

        let worker_handle = tokio::spawn(SchedulerWorker::run(
            max_concurrent,
            command_rx,
            event_tx.clone(),
        ));

        Self {
            command_tx,
            event_tx,
            worker_handle,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.event_tx.subscribe()
    }

    /// Resolves once the job is terminal; `None` for unknown ids.
    pub async fn wait(&self, id: JobId) -> Result<Option<JobResult>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(SchedulerCommand::Wait { id, reply: reply_tx }).await?;
        Ok(reply_rx.await.ok())
    }

    pub async fn snapshot(&self, id: JobId) -> Result<Option<JobSnapshot>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(SchedulerCommand::Snapshot { id, reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| UploadError::Shutdown)
    }

    /// Stops all jobs and the worker.
    pub async fn shutdown(self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(SchedulerCommand::Shutdown { reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| UploadError::Shutdown)?;
        self.worker_handle
            .await
            .map_err(|err| UploadError::Network(format!("scheduler worker panicked: {}", err)))
    }

    async fn send(&self, command: SchedulerCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| UploadError::Shutdown)
    }
}

#[async_trait]
impl JobScheduler for UploadScheduler {
    async fn submit(&self, job: UploadJob) -> Result<SubmitOutcome> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(SchedulerCommand::Submit { job, reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| UploadError::Shutdown)
    }

    async fn cancel(&self, id: JobId) -> Result<bool> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(SchedulerCommand::Cancel { id, reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| UploadError::Shutdown)
    }
}
