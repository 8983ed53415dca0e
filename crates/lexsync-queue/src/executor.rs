//! Job execution: the page loop and failure classification

use crate::repository::SyncJobRepository;
use crate::service::requeue_after;
use lexsync_client::backoff::backoff_delay;
use lexsync_client::RemoteApi;
use lexsync_core::settings::{RetrySettings, WorkerSettings};
use lexsync_core::{BatchSyncJob, Job, SingleEntityJob, SyncError, SyncMode, SyncResult};
use lexsync_entities::sync_jobs;
use lexsync_metrics::MetricsRecorder;
use lexsync_store::{ConnectionRepository, RecordRepository};
use lexsync_transform::HandlerRegistry;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

enum Outcome {
    Completed,
    Cancelled,
}

/// Executes one job at a time: fetch, transform, upsert, checkpoint.
///
/// Classification of failures lives here: retryable errors return the job to
/// pending and schedule a delayed requeue; anything else fails the job with
/// its stable error code. Persistence failures while recording an outcome
/// are logged, never panicked on.
pub struct JobExecutor {
    client: Arc<dyn RemoteApi>,
    registry: Arc<HandlerRegistry>,
    records: Arc<RecordRepository>,
    connections: Arc<ConnectionRepository>,
    jobs: Arc<SyncJobRepository>,
    metrics: MetricsRecorder,
    requeue: mpsc::WeakSender<Job>,
    retry: RetrySettings,
    page_size: u32,
}

impl JobExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Arc<dyn RemoteApi>,
        registry: Arc<HandlerRegistry>,
        records: Arc<RecordRepository>,
        connections: Arc<ConnectionRepository>,
        jobs: Arc<SyncJobRepository>,
        metrics: MetricsRecorder,
        requeue: mpsc::WeakSender<Job>,
        retry: RetrySettings,
        worker: &WorkerSettings,
    ) -> Self {
        Self {
            client,
            registry,
            records,
            connections,
            jobs,
            metrics,
            requeue,
            retry,
            page_size: worker.page_size,
        }
    }

    /// Run one job to an outcome and persist it.
    pub async fn execute(&self, job: Job) {
        let job_id = job.job_id();
        let row = match self.jobs.mark_in_progress(job_id).await {
            Ok(row) => row,
            Err(e) => {
                error!(job_id, error = %e, "could not claim job, dropping message");
                return;
            }
        };

        let started = Instant::now();
        let result = match &job {
            Job::BatchSync(batch) => self.run_batch(batch, &row).await,
            Job::SingleEntity(single) => self.run_single(single).await,
        };

        match result {
            Ok(Outcome::Completed) => {
                info!(job_id, elapsed_ms = started.elapsed().as_millis() as u64, "job completed");
                if let Err(e) = self.jobs.mark_completed(job_id).await {
                    error!(job_id, error = %e, "failed to record job completion");
                }
                self.metrics.record_event("sync.job.completed").await;
                self.metrics
                    .record_duration("sync.job", started.elapsed())
                    .await;
            }
            Ok(Outcome::Cancelled) => {
                info!(job_id, "job cancelled at page boundary");
                if let Err(e) = self
                    .jobs
                    .mark_failed(job_id, "cancelled", "cancellation requested")
                    .await
                {
                    error!(job_id, error = %e, "failed to record job cancellation");
                }
                self.metrics.record_event("sync.job.cancelled").await;
            }
            Err(e) if e.is_retryable() && row.attempts < row.max_attempts => {
                let delay = backoff_delay(
                    row.attempts as u32,
                    self.retry.backoff_base_ms,
                    self.retry.backoff_cap_ms,
                );
                warn!(
                    job_id,
                    attempts = row.attempts,
                    max_attempts = row.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient failure, requeueing with backoff"
                );
                if let Err(persist) = self.jobs.mark_retry_pending(job_id).await {
                    error!(job_id, error = %persist, "failed to return job to pending");
                    return;
                }
                self.metrics.record_event("sync.job.retried").await;
                requeue_after(self.requeue.clone(), job, delay);
            }
            Err(e) => {
                warn!(job_id, code = e.code(), error = %e, "job failed");
                if let Err(persist) = self.jobs.mark_failed(job_id, e.code(), &e.to_string()).await
                {
                    error!(job_id, error = %persist, "failed to record job failure");
                }
                self.metrics.record_error("sync.job.failed", e.code()).await;
            }
        }
    }

    /// Page-by-page batch sync, resuming from the checkpointed cursor.
    async fn run_batch(
        &self,
        job: &BatchSyncJob,
        row: &sync_jobs::Model,
    ) -> SyncResult<Outcome> {
        let handler = self.registry.get(job.entity_type);
        // A non-active connection gets no remote traffic; the job fails with
        // reauthorization_required instead of hitting a dead grant.
        let connection = self.connections.find_syncable(job.connection_id).await?;
        let updated_since = match job.mode {
            SyncMode::Incremental => connection.last_synced_at,
            _ => None,
        };
        // The watermark candidate: records modified after this instant are
        // picked up by the next incremental run even if this job re-fetched
        // some of them.
        let started_at = row.started_at.unwrap_or_else(chrono::Utc::now);

        let mut cursor = row.cursor.clone();
        let mut pages_done = row.pages_done;
        let mut records_upserted = row.records_upserted;

        loop {
            let page = self
                .client
                .fetch_page(
                    job.connection_id,
                    handler.collection_path(),
                    handler.updated_since_param(),
                    cursor.as_deref(),
                    updated_since,
                    self.page_size,
                )
                .await?;

            for payload in &page.records {
                let projection = handler.transform(payload)?;
                self.records.upsert(job.connection_id, &projection).await?;
                records_upserted += 1;
            }
            pages_done += 1;
            cursor = page.next_cursor;

            // Checkpoint before anything else: a crash from here on resumes
            // at the next page, not at the start.
            self.jobs
                .checkpoint(job.job_id, cursor.clone(), pages_done, records_upserted)
                .await?;
            self.metrics.record_event("sync.page.processed").await;

            if self.jobs.find(job.job_id).await?.cancel_requested {
                return Ok(Outcome::Cancelled);
            }
            if cursor.is_none() {
                break;
            }
        }

        self.connections
            .advance_watermark(job.connection_id, started_at)
            .await?;
        Ok(Outcome::Completed)
    }

    /// Webhook-triggered narrow job: one record, fetched or soft-deleted.
    async fn run_single(&self, job: &SingleEntityJob) -> SyncResult<Outcome> {
        if job.deletion {
            self.records
                .soft_delete(job.connection_id, job.remote_id)
                .await?;
            return Ok(Outcome::Completed);
        }

        // Same gate as the batch path; deletions above are local-only and
        // need no credentials.
        self.connections.find_syncable(job.connection_id).await?;

        let handler = self.registry.get(job.entity_type);
        let payload = self
            .client
            .fetch_single(job.connection_id, handler.collection_path(), job.remote_id)
            .await?;
        let projection = handler.transform(&payload)?;
        self.records.upsert(job.connection_id, &projection).await?;
        Ok(Outcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lexsync_client::Page;
    use lexsync_core::settings::MetricsSettings;
    use lexsync_core::{ConnectionStatus, EncryptionService, EntityType, UtcDateTime};
    use lexsync_database::test_utils::setup_test_db;
    use lexsync_entities::{connections, users};
    use sea_orm::{ActiveModelTrait, ActiveValue::Set, DatabaseConnection};
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted remote: pops one response per fetch_page call.
    struct ScriptedRemote {
        pages: Mutex<VecDeque<SyncResult<Page>>>,
        singles: Mutex<VecDeque<SyncResult<Value>>>,
        seen_updated_since: Mutex<Vec<Option<UtcDateTime>>>,
    }

    impl ScriptedRemote {
        fn new(pages: Vec<SyncResult<Page>>) -> Self {
            Self {
                pages: Mutex::new(pages.into()),
                singles: Mutex::new(VecDeque::new()),
                seen_updated_since: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RemoteApi for ScriptedRemote {
        async fn fetch_page(
            &self,
            _connection_id: i32,
            _collection_path: &str,
            _updated_since_param: &str,
            _cursor: Option<&str>,
            updated_since: Option<UtcDateTime>,
            _page_size: u32,
        ) -> SyncResult<Page> {
            self.seen_updated_since.lock().unwrap().push(updated_since);
            self.pages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| panic!("fetch_page called more times than scripted"))
        }

        async fn fetch_single(
            &self,
            _connection_id: i32,
            _collection_path: &str,
            _remote_id: i64,
        ) -> SyncResult<Value> {
            self.singles
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| panic!("fetch_single called more times than scripted"))
        }

        async fn register_webhook(
            &self,
            _connection_id: i32,
            _entity_type: &str,
            _callback_url: &str,
        ) -> SyncResult<i64> {
            unimplemented!("not used by the executor")
        }
    }

    fn page(ids: &[i64], next_cursor: Option<&str>) -> SyncResult<Page> {
        Ok(Page {
            records: ids
                .iter()
                .map(|id| json!({ "id": id, "updated_at": "2026-03-01T00:00:00Z" }))
                .collect(),
            next_cursor: next_cursor.map(str::to_string),
        })
    }

    async fn seed_connection(db: &DatabaseConnection) -> anyhow::Result<i32> {
        let user = users::ActiveModel {
            name: Set("Test User".to_string()),
            email: Set("test@example.com".to_string()),
            ..Default::default()
        }
        .insert(db)
        .await?;
        let connection = connections::ActiveModel {
            user_id: Set(user.id),
            provider: Set("practicehub".to_string()),
            remote_account_id: Set(1),
            access_token: Set("enc".to_string()),
            refresh_token: Set("enc".to_string()),
            ..Default::default()
        }
        .insert(db)
        .await?;
        Ok(connection.id)
    }

    struct Harness {
        executor: JobExecutor,
        jobs: Arc<SyncJobRepository>,
        records: Arc<RecordRepository>,
        connections: Arc<ConnectionRepository>,
        receiver: mpsc::Receiver<Job>,
        // Keeps the weak requeue sender upgradeable for the test's lifetime
        _sender: mpsc::Sender<Job>,
        connection_id: i32,
    }

    async fn harness(remote: Arc<ScriptedRemote>) -> anyhow::Result<Harness> {
        let db = setup_test_db().await?;
        let connection_id = seed_connection(&db).await?;
        let jobs = Arc::new(SyncJobRepository::new(db.clone()));
        let records = Arc::new(RecordRepository::new(db.clone()));
        let encryption =
            Arc::new(EncryptionService::new("0123456789abcdef0123456789abcdef").unwrap());
        let connections =
            Arc::new(ConnectionRepository::new(db, encryption, "http://remote.test")?);
        // No redis in unit tests; recording against an unreachable store is
        // best-effort and swallowed, which is exactly the contract.
        let metrics = MetricsRecorder::new(
            "redis://127.0.0.1:1/",
            MetricsSettings::default().retention_days,
        )?;
        let (sender, receiver) = mpsc::channel(16);

        let executor = JobExecutor::new(
            remote,
            Arc::new(HandlerRegistry::new()),
            records.clone(),
            connections.clone(),
            jobs.clone(),
            metrics,
            sender.downgrade(),
            RetrySettings {
                backoff_base_ms: 1,
                backoff_cap_ms: 2,
                ..RetrySettings::default()
            },
            &WorkerSettings::default(),
        );

        Ok(Harness {
            executor,
            jobs,
            records,
            connections,
            receiver,
            _sender: sender,
            connection_id,
        })
    }

    #[tokio::test]
    async fn test_three_pages_complete_and_advance_watermark() -> anyhow::Result<()> {
        let remote = Arc::new(ScriptedRemote::new(vec![
            page(&[1, 2], Some("c2")),
            page(&[3], Some("c3")),
            page(&[4], None),
        ]));
        let mut h = harness(remote).await?;

        let row = h
            .jobs
            .create_batch(h.connection_id, EntityType::Matter, SyncMode::Full, 5)
            .await?;
        h.executor
            .execute(SyncJobRepository::to_message(&row)?)
            .await;

        let row = h.jobs.find(row.id).await?;
        assert_eq!(row.status, "completed");
        assert_eq!(row.pages_done, 3);
        assert_eq!(row.records_upserted, 4);

        // All records landed, watermark advanced to the start time
        assert!(h.records.find(h.connection_id, 4).await?.is_some());
        let connection = h.connections.find_by_id(h.connection_id).await?;
        assert_eq!(connection.last_synced_at, row.started_at);
        h.receiver.close();
        Ok(())
    }

    #[tokio::test]
    async fn test_transient_page_failure_checkpoints_and_requeues() -> anyhow::Result<()> {
        let remote = Arc::new(ScriptedRemote::new(vec![
            page(&[1, 2], Some("c2")),
            Err(SyncError::TransientRemote {
                detail: "connection reset".to_string(),
            }),
        ]));
        let mut h = harness(remote).await?;

        let row = h
            .jobs
            .create_batch(h.connection_id, EntityType::Matter, SyncMode::Full, 5)
            .await?;
        h.executor
            .execute(SyncJobRepository::to_message(&row)?)
            .await;

        // Page 1 is checkpointed; the retry will resume at cursor c2
        let stored = h.jobs.find(row.id).await?;
        assert_eq!(stored.status, "pending");
        assert_eq!(stored.cursor.as_deref(), Some("c2"));
        assert_eq!(stored.pages_done, 1);
        assert_eq!(stored.records_upserted, 2);

        // Watermark NOT advanced on partial failure
        let connection = h.connections.find_by_id(h.connection_id).await?;
        assert!(connection.last_synced_at.is_none());

        // The delayed requeue message arrives
        let requeued = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            h.receiver.recv(),
        )
        .await?
        .expect("requeued job");
        assert_eq!(requeued.job_id(), row.id);
        Ok(())
    }

    #[tokio::test]
    async fn test_retries_exhausted_fails_with_transient_code() -> anyhow::Result<()> {
        let remote = Arc::new(ScriptedRemote::new(vec![Err(
            SyncError::TransientRemote {
                detail: "still down".to_string(),
            },
        )]));
        let mut h = harness(remote).await?;

        let row = h
            .jobs
            .create_batch(h.connection_id, EntityType::Contact, SyncMode::Full, 1)
            .await?;
        h.executor
            .execute(SyncJobRepository::to_message(&row)?)
            .await;

        let stored = h.jobs.find(row.id).await?;
        assert_eq!(stored.status, "failed");
        assert_eq!(stored.error_code.as_deref(), Some("transient_remote_error"));

        // Escalated to a failed job, not silently dropped or retried
        let connection = h.connections.find_by_id(h.connection_id).await?;
        assert!(connection.last_synced_at.is_none());
        h.receiver.close();
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_payload_fails_without_retry() -> anyhow::Result<()> {
        let remote = Arc::new(ScriptedRemote::new(vec![Ok(Page {
            records: vec![json!({ "updated_at": "2026-03-01T00:00:00Z" })],
            next_cursor: None,
        })]));
        let mut h = harness(remote).await?;

        let row = h
            .jobs
            .create_batch(h.connection_id, EntityType::Task, SyncMode::Full, 5)
            .await?;
        h.executor
            .execute(SyncJobRepository::to_message(&row)?)
            .await;

        let stored = h.jobs.find(row.id).await?;
        assert_eq!(stored.status, "failed");
        assert_eq!(stored.error_code.as_deref(), Some("malformed_payload"));
        assert!(stored
            .error_message
            .as_deref()
            .unwrap_or_default()
            .contains("id"));
        h.receiver.close();
        Ok(())
    }

    #[tokio::test]
    async fn test_incremental_mode_passes_watermark_full_does_not() -> anyhow::Result<()> {
        let remote = Arc::new(ScriptedRemote::new(vec![page(&[1], None), page(&[1], None)]));
        let mut h = harness(remote.clone()).await?;

        let watermark = chrono::Utc::now() - chrono::Duration::hours(6);
        h.connections
            .advance_watermark(h.connection_id, watermark)
            .await?;

        let incremental = h
            .jobs
            .create_batch(h.connection_id, EntityType::Matter, SyncMode::Incremental, 5)
            .await?;
        h.executor
            .execute(SyncJobRepository::to_message(&incremental)?)
            .await;

        let full = h
            .jobs
            .create_batch(h.connection_id, EntityType::Matter, SyncMode::Full, 5)
            .await?;
        h.executor
            .execute(SyncJobRepository::to_message(&full)?)
            .await;

        let seen = remote.seen_updated_since.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], Some(watermark));
        assert_eq!(seen[1], None);
        h.receiver.close();
        Ok(())
    }

    #[tokio::test]
    async fn test_cancellation_honored_at_page_boundary() -> anyhow::Result<()> {
        let remote = Arc::new(ScriptedRemote::new(vec![page(&[1], Some("c2"))]));
        let mut h = harness(remote).await?;

        let row = h
            .jobs
            .create_batch(h.connection_id, EntityType::Matter, SyncMode::Full, 5)
            .await?;
        // Cancellation arrives before execution; the job still processes the
        // current page, then stops at the boundary instead of fetching c2.
        h.jobs.request_cancel(row.id).await?;
        h.executor
            .execute(SyncJobRepository::to_message(&row)?)
            .await;

        let stored = h.jobs.find(row.id).await?;
        assert_eq!(stored.status, "failed");
        assert_eq!(stored.error_code.as_deref(), Some("cancelled"));
        assert_eq!(stored.pages_done, 1);
        h.receiver.close();
        Ok(())
    }

    #[tokio::test]
    async fn test_degraded_connection_gets_no_remote_calls() -> anyhow::Result<()> {
        // An empty script makes any fetch a test failure
        let remote = Arc::new(ScriptedRemote::new(vec![]));
        let mut h = harness(remote.clone()).await?;
        h.connections
            .mark_status(h.connection_id, ConnectionStatus::Degraded)
            .await?;

        let batch = h
            .jobs
            .create_batch(h.connection_id, EntityType::Matter, SyncMode::Full, 5)
            .await?;
        h.executor
            .execute(SyncJobRepository::to_message(&batch)?)
            .await;

        let stored = h.jobs.find(batch.id).await?;
        assert_eq!(stored.status, "failed");
        assert_eq!(stored.error_code.as_deref(), Some("reauthorization_required"));
        assert!(remote.seen_updated_since.lock().unwrap().is_empty());

        // The single-entity fetch path is cut off the same way
        let single = h
            .jobs
            .create_single(h.connection_id, EntityType::Contact, 42, false, 5)
            .await?;
        h.executor
            .execute(SyncJobRepository::to_message(&single)?)
            .await;
        let stored = h.jobs.find(single.id).await?;
        assert_eq!(stored.status, "failed");
        assert_eq!(stored.error_code.as_deref(), Some("reauthorization_required"));
        h.receiver.close();
        Ok(())
    }

    #[tokio::test]
    async fn test_single_entity_deletion_soft_deletes() -> anyhow::Result<()> {
        let remote = Arc::new(ScriptedRemote::new(vec![page(&[77], None)]));
        let mut h = harness(remote).await?;

        // Sync the record first so the deletion has something to flip
        let batch = h
            .jobs
            .create_batch(h.connection_id, EntityType::Contact, SyncMode::Full, 5)
            .await?;
        h.executor
            .execute(SyncJobRepository::to_message(&batch)?)
            .await;

        let deletion = h
            .jobs
            .create_single(h.connection_id, EntityType::Contact, 77, true, 5)
            .await?;
        h.executor
            .execute(SyncJobRepository::to_message(&deletion)?)
            .await;

        assert_eq!(h.jobs.find(deletion.id).await?.status, "completed");
        let record = h.records.find(h.connection_id, 77).await?.expect("row");
        assert_eq!(record.status, "deleted");
        h.receiver.close();
        Ok(())
    }
}
