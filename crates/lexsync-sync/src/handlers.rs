//! HTTP surface for launching and tracking batch syncs

use crate::service::SyncOrchestrator;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use lexsync_core::api::ApiError;
use lexsync_core::{EntityType, SyncError};
use lexsync_entities::sync_jobs;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{OpenApi, ToSchema};

#[derive(OpenApi)]
#[openapi(
    paths(start_sync, get_sync_job, cancel_sync_job),
    components(schemas(StartSyncRequest, JobSummary, JobProgress)),
    tags((name = "sync", description = "Batch sync control endpoints"))
)]
pub struct SyncApiDoc;

#[derive(Debug, Deserialize, ToSchema)]
pub struct StartSyncRequest {
    pub connection_id: i32,
    /// Entity types to sync; empty means all of them
    #[serde(default)]
    pub entities: Vec<String>,
    /// Full re-listing instead of incremental from the watermark
    #[serde(default)]
    pub full_sync: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct JobSummary {
    pub job_id: i32,
    pub entity_type: String,
    pub mode: String,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct JobProgress {
    pub job_id: i32,
    pub connection_id: i32,
    pub entity_type: String,
    pub mode: String,
    pub status: String,
    pub attempts: i32,
    pub pages_done: i32,
    pub records_upserted: i32,
    pub cancel_requested: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<sync_jobs::Model> for JobProgress {
    fn from(row: sync_jobs::Model) -> Self {
        Self {
            job_id: row.id,
            connection_id: row.connection_id,
            entity_type: row.entity_type,
            mode: row.mode,
            status: row.status,
            attempts: row.attempts,
            pages_done: row.pages_done,
            records_upserted: row.records_upserted,
            cancel_requested: row.cancel_requested,
            error_code: row.error_code,
            error_message: row.error_message,
            started_at: row.started_at,
            finished_at: row.finished_at,
        }
    }
}

fn parse_entities(raw: &[String]) -> Result<Vec<EntityType>, ApiError> {
    raw.iter()
        .map(|name| {
            EntityType::parse(name).ok_or_else(|| {
                ApiError(SyncError::MalformedPayload {
                    field_path: "entities".to_string(),
                    detail: format!("unknown entity type '{}'", name),
                })
            })
        })
        .collect()
}

/// Launch batch sync jobs for a connection.
#[utoipa::path(
    post,
    path = "/sync",
    request_body = StartSyncRequest,
    responses(
        (status = 202, description = "Jobs created and enqueued", body = [JobSummary]),
        (status = 400, description = "Unknown entity type"),
        (status = 401, description = "Connection requires re-authorization"),
        (status = 404, description = "Connection not found"),
    ),
    tag = "sync"
)]
pub async fn start_sync(
    State(orchestrator): State<Arc<SyncOrchestrator>>,
    Json(request): Json<StartSyncRequest>,
) -> Result<(StatusCode, Json<Vec<JobSummary>>), ApiError> {
    let entities = parse_entities(&request.entities)?;
    let rows = orchestrator
        .start_sync(request.connection_id, entities, request.full_sync)
        .await?;

    let summaries = rows
        .into_iter()
        .map(|row| JobSummary {
            job_id: row.id,
            entity_type: row.entity_type,
            mode: row.mode,
            status: row.status,
        })
        .collect();
    Ok((StatusCode::ACCEPTED, Json(summaries)))
}

/// Progress of one sync job.
#[utoipa::path(
    get,
    path = "/sync/{id}",
    params(("id" = i32, Path, description = "Job id")),
    responses(
        (status = 200, description = "Job progress", body = JobProgress),
        (status = 404, description = "Job not found"),
    ),
    tag = "sync"
)]
pub async fn get_sync_job(
    State(orchestrator): State<Arc<SyncOrchestrator>>,
    Path(job_id): Path<i32>,
) -> Result<Json<JobProgress>, ApiError> {
    let row = orchestrator.job_progress(job_id).await?;
    Ok(Json(row.into()))
}

/// Request cancellation of a running sync job.
#[utoipa::path(
    post,
    path = "/sync/{id}/cancel",
    params(("id" = i32, Path, description = "Job id")),
    responses(
        (status = 202, description = "Cancellation flagged", body = JobProgress),
        (status = 404, description = "Job not found"),
    ),
    tag = "sync"
)]
pub async fn cancel_sync_job(
    State(orchestrator): State<Arc<SyncOrchestrator>>,
    Path(job_id): Path<i32>,
) -> Result<(StatusCode, Json<JobProgress>), ApiError> {
    let row = orchestrator.cancel(job_id).await?;
    Ok((StatusCode::ACCEPTED, Json(row.into())))
}

pub fn configure_routes() -> Router<Arc<SyncOrchestrator>> {
    Router::new()
        .route("/sync", post(start_sync))
        .route("/sync/{id}", get(get_sync_job))
        .route("/sync/{id}/cancel", post(cancel_sync_job))
}
