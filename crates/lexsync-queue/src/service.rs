//! Queue service: durable enqueue and startup recovery

use crate::repository::SyncJobRepository;
use async_trait::async_trait;
use lexsync_core::{
    BatchSyncJob, EntityType, Job, JobQueue, QueueError, SingleEntityJob, SyncMode, SyncResult,
};
use lexsync_entities::sync_jobs;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Front door for enqueueing sync work.
///
/// The durable `sync_jobs` row is written before the in-process message is
/// sent. If the send then fails, the row stays `pending` and startup
/// recovery (or the next recovery pass) re-enqueues it; nothing is lost.
#[derive(Clone)]
pub struct SyncQueueService {
    job_sender: mpsc::Sender<Job>,
    jobs: Arc<SyncJobRepository>,
    max_attempts: u32,
}

impl SyncQueueService {
    pub fn new(
        job_sender: mpsc::Sender<Job>,
        jobs: Arc<SyncJobRepository>,
        max_attempts: u32,
    ) -> Self {
        Self {
            job_sender,
            jobs,
            max_attempts,
        }
    }

    pub fn create_channel(buffer_size: usize) -> (mpsc::Sender<Job>, mpsc::Receiver<Job>) {
        mpsc::channel(buffer_size)
    }

    /// Create and enqueue a batch sync job for one (connection, entity) key.
    pub async fn launch_batch_sync(
        &self,
        connection_id: i32,
        entity_type: EntityType,
        mode: SyncMode,
    ) -> SyncResult<sync_jobs::Model> {
        let row = self
            .jobs
            .create_batch(connection_id, entity_type, mode, self.max_attempts)
            .await?;

        info!(
            job_id = row.id,
            connection_id,
            entity_type = %entity_type,
            mode = %mode,
            "queueing batch sync job"
        );
        self.dispatch(Job::BatchSync(BatchSyncJob {
            job_id: row.id,
            connection_id,
            entity_type,
            mode,
        }))
        .await;

        Ok(row)
    }

    /// Create and enqueue a webhook-triggered single-entity job.
    pub async fn launch_single_entity(
        &self,
        connection_id: i32,
        entity_type: EntityType,
        remote_id: i64,
        deletion: bool,
    ) -> SyncResult<sync_jobs::Model> {
        let row = self
            .jobs
            .create_single(connection_id, entity_type, remote_id, deletion, self.max_attempts)
            .await?;

        info!(
            job_id = row.id,
            connection_id,
            entity_type = %entity_type,
            remote_id,
            deletion,
            "queueing single-entity job"
        );
        self.dispatch(Job::SingleEntity(SingleEntityJob {
            job_id: row.id,
            connection_id,
            entity_type,
            remote_id,
            deletion,
        }))
        .await;

        Ok(row)
    }

    /// Re-enqueue every job row left non-terminal by a previous process.
    ///
    /// Called once at startup, before the worker pool begins consuming.
    /// In-progress rows belonged to a crashed worker; they resume from their
    /// checkpointed cursor like any retry.
    pub async fn recover_pending(&self) -> SyncResult<usize> {
        let rows = self.jobs.find_recoverable().await?;
        let mut recovered = 0;

        for row in &rows {
            let message = match SyncJobRepository::to_message(row) {
                Ok(message) => message,
                Err(e) => {
                    // A row we cannot interpret is terminal, not a crash loop
                    error!(job_id = row.id, error = %e, "unrecoverable job row, failing it");
                    self.jobs.mark_failed(row.id, e.code(), &e.to_string()).await?;
                    continue;
                }
            };
            if row.status == "in_progress" {
                self.jobs.mark_retry_pending(row.id).await?;
            }
            self.dispatch(message).await;
            recovered += 1;
        }

        if recovered > 0 {
            info!(recovered, "re-enqueued jobs from previous run");
        }
        Ok(recovered)
    }

    /// Best-effort send; a closed or full channel leaves the pending row for
    /// the next recovery pass.
    async fn dispatch(&self, job: Job) {
        if let Err(e) = self.job_sender.send(job).await {
            warn!(error = %e, "queue channel unavailable, job row remains pending");
        }
    }
}

#[async_trait]
impl JobQueue for SyncQueueService {
    async fn send(&self, job: Job) -> Result<(), QueueError> {
        self.job_sender
            .send(job)
            .await
            .map_err(|e| QueueError::SendError(e.to_string()))
    }
}

/// Requeue a job message after a backoff delay without tying up a worker.
///
/// Holds only a weak sender so in-flight backoffs never keep the queue
/// channel open past shutdown. The job row is already back in `pending`
/// when this is scheduled; if the send fails (or the queue is gone), the
/// row is picked up by the next recovery pass.
pub(crate) fn requeue_after(sender: mpsc::WeakSender<Job>, job: Job, delay: std::time::Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let job_id = job.job_id();
        let Some(sender) = sender.upgrade() else {
            warn!(job_id, "queue gone before requeue, row remains pending");
            return;
        };
        if let Err(e) = sender.send(job).await {
            warn!(job_id, error = %e, "requeue send failed, row remains pending");
        }
    });
}
