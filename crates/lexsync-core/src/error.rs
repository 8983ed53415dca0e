//! Common error taxonomy used across all Lexsync services

use thiserror::Error;

/// Errors produced by the sync engine.
///
/// The worker pool classifies these into retryable and non-retryable
/// failures via [`SyncError::is_retryable`]; the stable code from
/// [`SyncError::code`] is what gets persisted on failed jobs and exposed
/// through the job status endpoint.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Transient remote error: {detail}")]
    TransientRemote { detail: String },

    #[error("Rate limit exceeded after {attempts} attempts")]
    RateLimitExceeded { attempts: u32 },

    #[error("Remote call timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Connection {connection_id} requires re-authorization")]
    ReauthorizationRequired { connection_id: i32 },

    #[error("Malformed payload at '{field_path}': {detail}")]
    MalformedPayload { field_path: String, detail: String },

    #[error("Webhook signature invalid")]
    SignatureInvalid,

    #[error("Connection not found: {detail}")]
    ConnectionNotFound { detail: String },

    #[error("Sync job not found: {job_id}")]
    JobNotFound { job_id: i32 },

    /// Two writers raced on the same natural key. Absorbed by the
    /// conflict-aware upsert; never surfaced to callers.
    #[error("Storage conflict on (connection {connection_id}, remote {remote_id})")]
    StorageConflict { connection_id: i32, remote_id: i64 },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Metrics store error: {0}")]
    Metrics(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl SyncError {
    /// Whether the worker pool should requeue the job with backoff.
    ///
    /// Network failures, rate limiting, and timeouts are retryable; schema
    /// violations and credential failures are terminal until a human (or
    /// re-authorization) intervenes.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::TransientRemote { .. }
                | SyncError::RateLimitExceeded { .. }
                | SyncError::Timeout { .. }
                | SyncError::Database(_)
        )
    }

    /// Stable error code recorded on failed jobs and returned by the job
    /// status endpoint.
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::TransientRemote { .. } => "transient_remote_error",
            SyncError::RateLimitExceeded { .. } => "rate_limit_exceeded",
            SyncError::Timeout { .. } => "remote_timeout",
            SyncError::ReauthorizationRequired { .. } => "reauthorization_required",
            SyncError::MalformedPayload { .. } => "malformed_payload",
            SyncError::SignatureInvalid => "signature_invalid",
            SyncError::ConnectionNotFound { .. } => "connection_not_found",
            SyncError::JobNotFound { .. } => "job_not_found",
            SyncError::StorageConflict { .. } => "storage_conflict",
            SyncError::Database(_) => "database_error",
            SyncError::Serialization(_) => "serialization_error",
            SyncError::Metrics(_) => "metrics_error",
            SyncError::Internal(_) => "internal_error",
        }
    }
}

/// Result type alias for sync engine operations
pub type SyncResult<T> = Result<T, SyncError>;
