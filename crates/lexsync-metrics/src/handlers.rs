//! Read-only metrics API

use crate::recorder::{MetricsRecorder, MetricsSummary};
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::NaiveDate;
use lexsync_core::api::ApiError;
use lexsync_core::SyncError;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::{IntoParams, OpenApi};

#[derive(OpenApi)]
#[openapi(
    paths(get_daily, get_hourly),
    components(schemas(MetricsSummary)),
    tags((name = "metrics", description = "Aggregated sync and webhook counters"))
)]
pub struct MetricsApiDoc;

#[derive(Deserialize, IntoParams)]
pub struct DailyParams {
    /// Day to aggregate, `YYYY-MM-DD`
    date: String,
}

#[derive(Deserialize, IntoParams)]
pub struct HourlyParams {
    /// Day to aggregate, `YYYY-MM-DD`
    date: String,
    /// Hour of the day, 0-23
    hour: u32,
}

fn parse_date(raw: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| {
        ApiError(SyncError::MalformedPayload {
            field_path: "date".to_string(),
            detail: format!("expected YYYY-MM-DD: {}", e),
        })
    })
}

#[utoipa::path(
    get,
    path = "/metrics/daily",
    params(DailyParams),
    responses(
        (status = 200, description = "Counters summed over the day", body = MetricsSummary),
        (status = 400, description = "Invalid date"),
    ),
    tag = "metrics"
)]
pub async fn get_daily(
    State(recorder): State<Arc<MetricsRecorder>>,
    Query(params): Query<DailyParams>,
) -> Result<Json<MetricsSummary>, ApiError> {
    let date = parse_date(&params.date)?;
    Ok(Json(recorder.daily(date).await?))
}

#[utoipa::path(
    get,
    path = "/metrics/hourly",
    params(HourlyParams),
    responses(
        (status = 200, description = "Counters for one hour", body = MetricsSummary),
        (status = 400, description = "Invalid date or hour"),
    ),
    tag = "metrics"
)]
pub async fn get_hourly(
    State(recorder): State<Arc<MetricsRecorder>>,
    Query(params): Query<HourlyParams>,
) -> Result<Json<MetricsSummary>, ApiError> {
    let date = parse_date(&params.date)?;
    if params.hour > 23 {
        return Err(ApiError(SyncError::MalformedPayload {
            field_path: "hour".to_string(),
            detail: "hour must be 0-23".to_string(),
        }));
    }
    Ok(Json(recorder.hourly(date, params.hour).await?))
}

pub fn configure_routes() -> Router<Arc<MetricsRecorder>> {
    Router::new()
        .route("/metrics/daily", get(get_daily))
        .route("/metrics/hourly", get(get_hourly))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_accepts_iso_days() {
        assert!(parse_date("2026-03-01").is_ok());
        assert!(parse_date("03/01/2026").is_err());
        assert!(parse_date("").is_err());
    }
}
