//! Engine configuration
//!
//! Retry counts and backoff shape are deployment policy, not code; every
//! constant here can be overridden through the environment by the server
//! binary.

use serde::{Deserialize, Serialize};

/// Settings for the sync engine. All fields have workable defaults for
/// local development; production deployments override via environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Relational store connection string
    pub database_url: String,
    /// Ephemeral metrics store connection string
    pub redis_url: String,
    /// Practice-management API base URL
    pub remote_base_url: String,
    /// Provider tag expected in the inbound webhook path
    pub provider: String,
    /// Shared secret for inbound webhook HMAC validation
    pub webhook_secret: String,
    /// Publicly reachable base URL used when registering webhook callbacks
    pub callback_base_url: String,
    /// Hex-encoded 32-byte key for credential encryption at rest
    pub encryption_key: String,
    /// HTTP listen address for the control/webhook/metrics APIs
    pub listen_addr: String,

    pub worker: WorkerSettings,
    pub retry: RetrySettings,
    pub rate_limit: RateLimitSettings,
    pub metrics: MetricsSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Number of parallel job executors
    pub concurrency: usize,
    /// In-process queue buffer size
    pub queue_buffer: usize,
    /// Records requested per page from the remote API
    pub page_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Maximum attempts for a job (and for a rate-limited call) before FAILED
    pub max_attempts: u32,
    /// First backoff delay; doubles each attempt
    pub backoff_base_ms: u64,
    /// Ceiling on any single backoff delay
    pub backoff_cap_ms: u64,
    /// Per-call timeout for remote requests
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Token bucket capacity per connection
    pub burst: u32,
    /// Tokens replenished per second per connection
    pub per_second: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    /// Days before time-bucketed metric keys expire
    pub retention_days: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://lexsync.db?mode=rwc".to_string(),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            remote_base_url: "https://api.example-practice.test/v4".to_string(),
            provider: "practicehub".to_string(),
            webhook_secret: String::new(),
            callback_base_url: "http://localhost:8080".to_string(),
            encryption_key: String::new(),
            listen_addr: "0.0.0.0:8080".to_string(),
            worker: WorkerSettings::default(),
            retry: RetrySettings::default(),
            rate_limit: RateLimitSettings::default(),
            metrics: MetricsSettings::default(),
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            queue_buffer: 256,
            page_size: 200,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base_ms: 500,
            backoff_cap_ms: 60_000,
            request_timeout_secs: 30,
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            burst: 10,
            per_second: 2.0,
        }
    }
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self { retention_days: 7 }
    }
}

impl SyncSettings {
    /// Create settings from JSON value, using defaults for missing fields
    pub fn from_json(value: serde_json::Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }
}
