use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};
use super::job::UploadJob;
use super::store::JobStore;
use super::types::{JobId, JobResult, JobSnapshot, SchedulerEvent, SubmitOutcome};

pub(crate) enum SchedulerCommand {
    Submit {
        job: UploadJob,
        reply: oneshot::Sender<SubmitOutcome>,
    },
    Cancel {
        id: JobId,
        reply: oneshot::Sender<bool>,
    },
    /// The reply is dropped unanswered for unknown ids.
    Wait {
        id: JobId,
        reply: oneshot::Sender<JobResult>,
    },
    Snapshot {
        id: JobId,
        reply: oneshot::Sender<Option<JobSnapshot>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

pub(crate) struct SchedulerWorker {
    max_concurrent: usize,
    store: JobStore,
    event_tx: broadcast::Sender<SchedulerEvent>,
    completion_tx: mpsc::UnboundedSender<(JobId, JobResult)>,
    completion_rx: mpsc::UnboundedReceiver<(JobId, JobResult)>,
}

impl SchedulerWorker {
    pub(crate) async fn run(
        max_concurrent: usize,
        mut command_rx: mpsc::Receiver<SchedulerCommand>,
        event_tx: broadcast::Sender<SchedulerEvent>,
    ) {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let mut worker = Self {
            max_concurrent: max_concurrent.max(1),
            store: JobStore::new(),
            event_tx,
            completion_tx,
            completion_rx,
        };

        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(SchedulerCommand::Shutdown { reply }) => {
                        worker.shutdown().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => worker.handle_command(command),
                    None => {
                        worker.shutdown().await;
                        break;
                    }
                },
                Some((id, result)) = worker.completion_rx.recv() => {
                    worker.handle_completion(id, result);
                }
            }

            worker.process_queue();
        }

        debug!("Scheduler worker stopped");
    }

    fn handle_command(&mut self, command: SchedulerCommand) {
        match command {
            SchedulerCommand::Submit { job, reply } => {
                let outcome = self.submit(job);
                let _ = reply.send(outcome);
            }
            SchedulerCommand::Cancel { id, reply } => {
                let cancelled = self.cancel(id);
                let _ = reply.send(cancelled);
            }
            SchedulerCommand::Wait { id, reply } => {
                self.store.add_waiter(&id, reply);
            }
            SchedulerCommand::Snapshot { id, reply } => {
                let _ = reply.send(self.store.snapshot(&id));
            }
            SchedulerCommand::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn submit(&mut self, job: UploadJob) -> SubmitOutcome {
        let key = job.dedup_key().to_string();
        if let Some(existing) = self.store.active_job_for(&key) {
            info!("Upload of {} already queued or running as {}, dropping", key, existing);
            let _ = self.event_tx.send(SchedulerEvent::Dropped { key, existing });
            return SubmitOutcome::Dropped { existing };
        }

        let id = self.store.add_job(job);
        debug!("Queued job {} for {}", id, key);
        let _ = self.event_tx.send(SchedulerEvent::Accepted { id, key });
        SubmitOutcome::Accepted(id)
    }

    fn cancel(&mut self, id: JobId) -> bool {
        if let Some(job) = self.store.take_pending(&id) {
            info!("Cancelled job {} before it started", id);
            cancel_unstarted(job);
            self.finish(id, JobResult::Cancelled);
            return true;
        }

        if self.store.is_running(&id) {
            if let Some(entry) = self.store.get(&id) {
                info!("Stopping job {}", id);
                entry.cancel.cancel();
                return true;
            }
        }

        false
    }

    fn handle_completion(&mut self, id: JobId, result: JobResult) {
        debug!("Job {} finished: {:?}", id, result);
        self.finish(id, result);
    }

    fn finish(&mut self, id: JobId, result: JobResult) {
        self.store.mark_finished(&id, result);
        let _ = self.event_tx.send(SchedulerEvent::Finished { id, result });
    }

    fn process_queue(&mut self) {
        while self.store.running_count() < self.max_concurrent {
            let Some(id) = self.store.next_pending() else {
                break;
            };
            self.start_job(id);
        }
    }

    fn start_job(&mut self, id: JobId) {
        let Some(entry) = self.store.get(&id) else {
            return;
        };

        let Some(job) = entry.job.clone() else {
            return;
        };
        let cancel = entry.cancel.clone();
        let completion_tx = self.completion_tx.clone();

        // The job runs in its own task so a panic inside it still ends in a
        // completion; the job is dropped before that completion goes out.
        let handle = tokio::spawn(async move {
            let run = tokio::spawn(async move { job.run(cancel).await });
            let result = match run.await {
                Ok(result) => result,
                Err(err) => {
                    error!("Job {} ended abnormally: {}", id, err);
                    JobResult::Failed
                }
            };
            let _ = completion_tx.send((id, result));
        });

        self.store.mark_running(&id, handle);
        let _ = self.event_tx.send(SchedulerEvent::Started { id });
    }

    /// Stops running jobs, drops queued ones and waits for the running ones
    /// to wind down.
    async fn shutdown(&mut self) {
        for id in self.store.pending_ids() {
            if let Some(job) = self.store.take_pending(&id) {
                cancel_unstarted(job);
                self.finish(id, JobResult::Cancelled);
            }
        }

        let handles = self.store.cancel_running();
        if !handles.is_empty() {
            info!("Waiting for {} running uploads to stop", handles.len());
        }
        for (id, handle) in handles {
            if let Err(err) = handle.await {
                warn!("Job {} ended abnormally: {}", id, err);
                self.finish(id, JobResult::Failed);
            }
        }

        while let Ok((id, result)) = self.completion_rx.try_recv() {
            self.finish(id, result);
        }
    }
}

/// Runs the job's cancel bookkeeping on the worker; a panicking sink must
/// not take the worker down with it.
fn cancel_unstarted(job: Arc<UploadJob>) {
    let id = job.id();
    if panic::catch_unwind(AssertUnwindSafe(|| job.cancel_unstarted())).is_err() {
        error!("Job {} panicked while being cancelled", id);
    }
}
