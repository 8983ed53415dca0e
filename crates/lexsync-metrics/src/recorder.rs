//! Time-bucketed counter recording and aggregation

use chrono::{NaiveDate, Timelike, Utc};
use lexsync_core::{SyncError, SyncResult};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::warn;
use utoipa::ToSchema;

const KEY_PREFIX: &str = "metrics";

/// Aggregated counters for one day or one hour.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MetricsSummary {
    /// Bucket date, `YYYY-MM-DD`
    pub date: String,
    /// Bucket hour (0-23); absent for daily aggregates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hour: Option<u32>,
    /// Counter name -> summed value. Error counters are suffixed with the
    /// stable error code, duration counters with `:ms` / `:count`.
    pub counters: HashMap<String, i64>,
}

struct Inner {
    client: redis::Client,
    manager: OnceCell<ConnectionManager>,
    retention_secs: i64,
}

/// Records engine events as expiring redis counters.
///
/// The connection is established lazily on first use and reused afterwards.
/// Write paths swallow redis failures after logging them; only the read
/// (aggregation) API propagates errors.
#[derive(Clone)]
pub struct MetricsRecorder {
    inner: Arc<Inner>,
}

impl MetricsRecorder {
    /// Validate the redis URL; no connection is made until first use.
    pub fn new(redis_url: &str, retention_days: u32) -> SyncResult<Self> {
        let client =
            redis::Client::open(redis_url).map_err(|e| SyncError::Metrics(e.to_string()))?;
        Ok(Self {
            inner: Arc::new(Inner {
                client,
                manager: OnceCell::new(),
                retention_secs: retention_days as i64 * 24 * 60 * 60,
            }),
        })
    }

    async fn manager(&self) -> Result<ConnectionManager, redis::RedisError> {
        self.inner
            .manager
            .get_or_try_init(|| async { self.inner.client.get_connection_manager().await })
            .await
            .cloned()
    }

    /// Count one occurrence of an event in the current hour bucket.
    pub async fn record_event(&self, event: &str) {
        self.incr(&self.bucket_key(event), 1).await;
    }

    /// Count one failure of an event, keyed by stable error code.
    pub async fn record_error(&self, event: &str, error_code: &str) {
        self.incr(&self.bucket_key(&format!("{}:{}", event, error_code)), 1)
            .await;
    }

    /// Accumulate a duration for an event (`:ms` sum plus `:count`).
    pub async fn record_duration(&self, event: &str, elapsed: Duration) {
        self.incr(
            &self.bucket_key(&format!("{}:ms", event)),
            elapsed.as_millis() as i64,
        )
        .await;
        self.incr(&self.bucket_key(&format!("{}:count", event)), 1)
            .await;
    }

    /// Counters summed over every hour of one day.
    pub async fn daily(&self, date: NaiveDate) -> SyncResult<MetricsSummary> {
        let pattern = format!("{}:{}:*", KEY_PREFIX, date.format("%Y-%m-%d"));
        let counters = self.aggregate(&pattern).await?;
        Ok(MetricsSummary {
            date: date.format("%Y-%m-%d").to_string(),
            hour: None,
            counters,
        })
    }

    /// Counters for one hour of one day.
    pub async fn hourly(&self, date: NaiveDate, hour: u32) -> SyncResult<MetricsSummary> {
        let pattern = format!("{}:{}:{:02}:*", KEY_PREFIX, date.format("%Y-%m-%d"), hour);
        let counters = self.aggregate(&pattern).await?;
        Ok(MetricsSummary {
            date: date.format("%Y-%m-%d").to_string(),
            hour: Some(hour),
            counters,
        })
    }

    fn bucket_key(&self, name: &str) -> String {
        let now = Utc::now();
        format!(
            "{}:{}:{:02}:{}",
            KEY_PREFIX,
            now.format("%Y-%m-%d"),
            now.hour(),
            name
        )
    }

    async fn incr(&self, key: &str, by: i64) {
        let mut conn = match self.manager().await {
            Ok(conn) => conn,
            Err(e) => {
                // Metrics never take down a sync path
                warn!(key, error = %e, "metrics store unavailable, dropping");
                return;
            }
        };

        let result: redis::RedisResult<()> = redis::pipe()
            .atomic()
            .incr(key, by)
            .ignore()
            .expire(key, self.inner.retention_secs)
            .ignore()
            .query_async(&mut conn)
            .await;

        if let Err(e) = result {
            warn!(key, error = %e, "failed to record metric, dropping");
        }
    }

    /// Sum all counters matching a key pattern, grouped by the counter name
    /// after the `metrics:{date}:{hour}:` prefix.
    async fn aggregate(&self, pattern: &str) -> SyncResult<HashMap<String, i64>> {
        let mut conn = self
            .manager()
            .await
            .map_err(|e| SyncError::Metrics(e.to_string()))?;

        let keys: Vec<String> = conn
            .keys(pattern)
            .await
            .map_err(|e| SyncError::Metrics(e.to_string()))?;

        let mut counters: HashMap<String, i64> = HashMap::new();
        if keys.is_empty() {
            return Ok(counters);
        }

        let values: Vec<Option<i64>> = conn
            .mget(&keys)
            .await
            .map_err(|e| SyncError::Metrics(e.to_string()))?;

        for (key, value) in keys.iter().zip(values) {
            let name: String = key.splitn(4, ':').skip(3).collect();
            if let Some(value) = value {
                *counters.entry(name).or_insert(0) += value;
            }
        }

        Ok(counters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_does_not_touch_the_network() {
        // An unreachable port is fine until a command is issued
        assert!(MetricsRecorder::new("redis://127.0.0.1:1/", 7).is_ok());
        assert!(MetricsRecorder::new("not a url", 7).is_err());
    }

    #[tokio::test]
    async fn test_recording_against_unreachable_store_is_swallowed() {
        let recorder = MetricsRecorder::new("redis://127.0.0.1:1/", 7).unwrap();
        // Must not error or panic; the sync path depends on this contract
        recorder.record_event("sync.job.completed").await;
        recorder.record_error("sync.job.failed", "remote_timeout").await;
        recorder
            .record_duration("sync.job", Duration::from_millis(42))
            .await;
    }

    #[tokio::test]
    async fn test_reads_against_unreachable_store_propagate() {
        let recorder = MetricsRecorder::new("redis://127.0.0.1:1/", 7).unwrap();
        let result = recorder
            .daily(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap())
            .await;
        assert!(matches!(result, Err(SyncError::Metrics(_))));
    }

    #[test]
    fn test_counter_name_extraction_keeps_error_suffix() {
        // metrics:2026-03-01:10:sync.failed:transient_remote_error
        let key = "metrics:2026-03-01:10:sync.failed:transient_remote_error";
        let name: String = key.splitn(4, ':').skip(3).collect();
        assert_eq!(name, "sync.failed:transient_remote_error");
    }

    #[test]
    fn test_summary_serialization_omits_absent_hour() {
        let summary = MetricsSummary {
            date: "2026-03-01".to_string(),
            hour: None,
            counters: HashMap::new(),
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert!(json.get("hour").is_none());
    }
}
