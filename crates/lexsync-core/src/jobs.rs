use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{EntityType, SyncMode};

/// Message describing a batch sync job (full or incremental) for one
/// (connection, entity type) key. The durable `sync_jobs` row is created
/// before this message is sent; `job_id` points back at it.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BatchSyncJob {
    pub job_id: i32,
    pub connection_id: i32,
    pub entity_type: EntityType,
    pub mode: SyncMode,
}

/// Message describing a webhook-triggered single-entity fetch.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SingleEntityJob {
    pub job_id: i32,
    pub connection_id: i32,
    pub entity_type: EntityType,
    pub remote_id: i64,
    /// Deletion events soft-delete the local row instead of fetching.
    pub deletion: bool,
}

/// Core job enum containing all possible job types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Job {
    BatchSync(BatchSyncJob),
    SingleEntity(SingleEntityJob),
}

impl Job {
    /// Durable job row id backing this message
    pub fn job_id(&self) -> i32 {
        match self {
            Job::BatchSync(job) => job.job_id,
            Job::SingleEntity(job) => job.job_id,
        }
    }

    /// Serialization key for per-key locking: one in-progress job per
    /// (connection, entity type) at a time.
    pub fn lock_key(&self) -> (i32, EntityType) {
        match self {
            Job::BatchSync(job) => (job.connection_id, job.entity_type),
            Job::SingleEntity(job) => (job.connection_id, job.entity_type),
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::BatchSync(job) => write!(
                f,
                "BatchSync(job: {}, connection: {}, entity: {}, mode: {})",
                job.job_id, job.connection_id, job.entity_type, job.mode
            ),
            Job::SingleEntity(job) => write!(
                f,
                "SingleEntity(job: {}, connection: {}, entity: {}, remote_id: {}, deletion: {})",
                job.job_id, job.connection_id, job.entity_type, job.remote_id, job.deletion
            ),
        }
    }
}

// Core queue abstraction - lexsync-queue implements this
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Failed to send job: {0}")]
    SendError(String),
    #[error("Failed to receive job: {0}")]
    ReceiveError(String),
    #[error("Queue channel closed")]
    ChannelClosed,
    #[error("Invalid job data: {0}")]
    InvalidData(String),
}

/// Core trait for job queue operations
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Send a job to the queue
    async fn send(&self, job: Job) -> Result<(), QueueError>;
}

/// Core trait for receiving jobs
#[async_trait]
pub trait JobReceiver: Send {
    /// Receive the next job
    async fn recv(&mut self) -> Result<Job, QueueError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_display_formatting() {
        let batch = Job::BatchSync(BatchSyncJob {
            job_id: 7,
            connection_id: 3,
            entity_type: EntityType::Matter,
            mode: SyncMode::Incremental,
        });
        let single = Job::SingleEntity(SingleEntityJob {
            job_id: 8,
            connection_id: 3,
            entity_type: EntityType::Contact,
            remote_id: 789012,
            deletion: false,
        });

        assert!(format!("{}", batch).contains("BatchSync"));
        assert!(format!("{}", batch).contains("incremental"));
        assert!(format!("{}", single).contains("789012"));
    }

    #[test]
    fn test_lock_key_groups_by_connection_and_entity() {
        let batch = Job::BatchSync(BatchSyncJob {
            job_id: 1,
            connection_id: 42,
            entity_type: EntityType::Task,
            mode: SyncMode::Full,
        });
        let single = Job::SingleEntity(SingleEntityJob {
            job_id: 2,
            connection_id: 42,
            entity_type: EntityType::Task,
            remote_id: 11,
            deletion: true,
        });
        assert_eq!(batch.lock_key(), single.lock_key());
    }

    #[test]
    fn test_job_serde_round_trip() {
        let job = Job::SingleEntity(SingleEntityJob {
            job_id: 5,
            connection_id: 1,
            entity_type: EntityType::Activity,
            remote_id: 9_007_199_254_740_993, // beyond f64 precision
            deletion: false,
        });
        let json = serde_json::to_string(&job).unwrap();
        let parsed: Job = serde_json::from_str(&json).unwrap();
        match parsed {
            Job::SingleEntity(data) => assert_eq!(data.remote_id, 9_007_199_254_740_993),
            _ => panic!("Expected SingleEntity job"),
        }
    }
}
