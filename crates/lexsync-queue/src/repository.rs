//! Durable sync job rows

use lexsync_core::{
    BatchSyncJob, EntityType, Job, JobStatus, SingleEntityJob, SyncError, SyncMode, SyncResult,
};
use lexsync_entities::sync_jobs;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder,
};
use std::sync::Arc;

/// Repository for `sync_jobs` rows. The row is the durable source of truth
/// for a job's lifecycle; in-process messages only point at it by id.
pub struct SyncJobRepository {
    db: Arc<DatabaseConnection>,
}

impl SyncJobRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn create_batch(
        &self,
        connection_id: i32,
        entity_type: EntityType,
        mode: SyncMode,
        max_attempts: u32,
    ) -> SyncResult<sync_jobs::Model> {
        sync_jobs::ActiveModel {
            connection_id: Set(connection_id),
            entity_type: Set(entity_type.as_str().to_string()),
            mode: Set(mode.as_str().to_string()),
            max_attempts: Set(max_attempts as i32),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await
        .map_err(|e| SyncError::Database(e.to_string()))
    }

    pub async fn create_single(
        &self,
        connection_id: i32,
        entity_type: EntityType,
        remote_id: i64,
        deletion: bool,
        max_attempts: u32,
    ) -> SyncResult<sync_jobs::Model> {
        sync_jobs::ActiveModel {
            connection_id: Set(connection_id),
            entity_type: Set(entity_type.as_str().to_string()),
            mode: Set(SyncMode::Single.as_str().to_string()),
            remote_id: Set(Some(remote_id)),
            deletion: Set(deletion),
            max_attempts: Set(max_attempts as i32),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await
        .map_err(|e| SyncError::Database(e.to_string()))
    }

    pub async fn find(&self, job_id: i32) -> SyncResult<sync_jobs::Model> {
        sync_jobs::Entity::find_by_id(job_id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?
            .ok_or(SyncError::JobNotFound { job_id })
    }

    /// Transition to in_progress, counting the attempt. `started_at` is set
    /// on the first attempt only; the watermark uses it after completion.
    pub async fn mark_in_progress(&self, job_id: i32) -> SyncResult<sync_jobs::Model> {
        let job = self.find(job_id).await?;
        let attempts = job.attempts + 1;
        let started_at = job.started_at.unwrap_or_else(chrono::Utc::now);

        let mut model: sync_jobs::ActiveModel = job.into();
        model.status = Set(JobStatus::InProgress.as_str().to_string());
        model.attempts = Set(attempts);
        model.started_at = Set(Some(started_at));
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| SyncError::Database(e.to_string()))
    }

    /// Persist page progress so a retry resumes from here.
    pub async fn checkpoint(
        &self,
        job_id: i32,
        cursor: Option<String>,
        pages_done: i32,
        records_upserted: i32,
    ) -> SyncResult<()> {
        let job = self.find(job_id).await?;
        let mut model: sync_jobs::ActiveModel = job.into();
        model.cursor = Set(cursor);
        model.pages_done = Set(pages_done);
        model.records_upserted = Set(records_upserted);
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;
        Ok(())
    }

    pub async fn mark_completed(&self, job_id: i32) -> SyncResult<()> {
        let job = self.find(job_id).await?;
        let mut model: sync_jobs::ActiveModel = job.into();
        model.status = Set(JobStatus::Completed.as_str().to_string());
        model.finished_at = Set(Some(chrono::Utc::now()));
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;
        Ok(())
    }

    /// Return a transiently-failed job to pending for a later retry.
    pub async fn mark_retry_pending(&self, job_id: i32) -> SyncResult<()> {
        let job = self.find(job_id).await?;
        let mut model: sync_jobs::ActiveModel = job.into();
        model.status = Set(JobStatus::Pending.as_str().to_string());
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;
        Ok(())
    }

    pub async fn mark_failed(
        &self,
        job_id: i32,
        error_code: &str,
        error_message: &str,
    ) -> SyncResult<()> {
        let job = self.find(job_id).await?;
        let mut model: sync_jobs::ActiveModel = job.into();
        model.status = Set(JobStatus::Failed.as_str().to_string());
        model.error_code = Set(Some(error_code.to_string()));
        model.error_message = Set(Some(error_message.to_string()));
        model.finished_at = Set(Some(chrono::Utc::now()));
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;
        Ok(())
    }

    pub async fn request_cancel(&self, job_id: i32) -> SyncResult<sync_jobs::Model> {
        let job = self.find(job_id).await?;
        let mut model: sync_jobs::ActiveModel = job.into();
        model.cancel_requested = Set(true);
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| SyncError::Database(e.to_string()))
    }

    /// Jobs left non-terminal by a previous process: still-pending rows plus
    /// in_progress rows orphaned by a crashed worker, in enqueue order.
    pub async fn find_recoverable(&self) -> SyncResult<Vec<sync_jobs::Model>> {
        sync_jobs::Entity::find()
            .filter(
                Condition::any()
                    .add(sync_jobs::Column::Status.eq(JobStatus::Pending.as_str()))
                    .add(sync_jobs::Column::Status.eq(JobStatus::InProgress.as_str())),
            )
            .order_by_asc(sync_jobs::Column::EnqueuedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| SyncError::Database(e.to_string()))
    }

    /// Rebuild the in-process message for a durable row.
    pub fn to_message(job: &sync_jobs::Model) -> SyncResult<Job> {
        let entity_type =
            EntityType::parse(&job.entity_type).ok_or_else(|| SyncError::MalformedPayload {
                field_path: "entity_type".to_string(),
                detail: format!("unknown entity type '{}'", job.entity_type),
            })?;
        let mode = SyncMode::parse(&job.mode).ok_or_else(|| SyncError::MalformedPayload {
            field_path: "mode".to_string(),
            detail: format!("unknown sync mode '{}'", job.mode),
        })?;

        Ok(match mode {
            SyncMode::Single => Job::SingleEntity(SingleEntityJob {
                job_id: job.id,
                connection_id: job.connection_id,
                entity_type,
                remote_id: job.remote_id.ok_or_else(|| SyncError::MalformedPayload {
                    field_path: "remote_id".to_string(),
                    detail: "single-entity job without a remote id".to_string(),
                })?,
                deletion: job.deletion,
            }),
            mode => Job::BatchSync(BatchSyncJob {
                job_id: job.id,
                connection_id: job.connection_id,
                entity_type,
                mode,
            }),
        })
    }
}
