//! Batch sync orchestration

use lexsync_core::{EntityType, SyncMode, SyncResult};
use lexsync_entities::sync_jobs;
use lexsync_queue::{SyncJobRepository, SyncQueueService};
use lexsync_store::ConnectionRepository;
use std::sync::Arc;
use tracing::info;

/// Launches and tracks batch sync jobs.
///
/// One job per (connection, entity type) is created and enqueued; per-key
/// serialization and the page loop live on the worker side.
pub struct SyncOrchestrator {
    connections: Arc<ConnectionRepository>,
    jobs: Arc<SyncJobRepository>,
    queue: SyncQueueService,
}

impl SyncOrchestrator {
    pub fn new(
        connections: Arc<ConnectionRepository>,
        jobs: Arc<SyncJobRepository>,
        queue: SyncQueueService,
    ) -> Self {
        Self {
            connections,
            jobs,
            queue,
        }
    }

    /// Create one pending batch job per requested entity type.
    ///
    /// The connection is resolved first so an unknown id fails before any
    /// row is written, and a degraded or disconnected connection is refused
    /// outright rather than queueing work that cannot reach the remote.
    /// An empty entity list means every entity type.
    pub async fn start_sync(
        &self,
        connection_id: i32,
        entities: Vec<EntityType>,
        full_sync: bool,
    ) -> SyncResult<Vec<sync_jobs::Model>> {
        let connection = self.connections.find_syncable(connection_id).await?;

        let entities = if entities.is_empty() {
            EntityType::all()
        } else {
            entities
        };
        let mode = if full_sync {
            SyncMode::Full
        } else {
            SyncMode::Incremental
        };

        let mut rows = Vec::with_capacity(entities.len());
        for entity_type in entities {
            let row = self
                .queue
                .launch_batch_sync(connection.id, entity_type, mode)
                .await?;
            rows.push(row);
        }

        info!(
            connection_id,
            mode = %mode,
            jobs = rows.len(),
            "batch sync launched"
        );
        Ok(rows)
    }

    pub async fn job_progress(&self, job_id: i32) -> SyncResult<sync_jobs::Model> {
        self.jobs.find(job_id).await
    }

    /// Flag a job for cancellation; the worker honors it at the next page
    /// boundary.
    pub async fn cancel(&self, job_id: i32) -> SyncResult<sync_jobs::Model> {
        let row = self.jobs.request_cancel(job_id).await?;
        info!(job_id, "cancellation requested");
        Ok(row)
    }
}
