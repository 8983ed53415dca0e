//! Shared domain types used across all Lexsync crates

use chrono::{DateTime as ChronoDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Database DateTime type used across all Lexsync crates
///
/// Canonical datetime type for database TIMESTAMPTZ columns.
pub type DBDateTime = ChronoDateTime<Utc>;

/// Standard UTC DateTime type used across all Lexsync crates
///
/// Canonical datetime type for API responses (serializes as ISO 8601 with
/// 'Z' suffix) and internal timestamps.
pub type UtcDateTime = ChronoDateTime<Utc>;

/// Remote entity types the sync engine knows how to handle.
///
/// Each variant maps to one collection in the practice-management API and
/// one entity handler in `lexsync-transform`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Matter,
    Contact,
    Activity,
    Task,
}

impl EntityType {
    /// Returns all syncable entity types
    pub fn all() -> Vec<Self> {
        vec![Self::Matter, Self::Contact, Self::Activity, Self::Task]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Matter => "matter",
            Self::Contact => "contact",
            Self::Activity => "activity",
            Self::Task => "task",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "matter" | "matters" => Some(Self::Matter),
            "contact" | "contacts" => Some(Self::Contact),
            "activity" | "activities" => Some(Self::Activity),
            "task" | "tasks" => Some(Self::Task),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Sync mode for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Fetch every page of the collection, ignoring the watermark
    Full,
    /// Fetch records updated since the connection's watermark
    Incremental,
    /// Fetch exactly one record (webhook-triggered)
    Single,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental => "incremental",
            Self::Single => "single",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "full" => Some(Self::Full),
            "incremental" => Some(Self::Incremental),
            "single" => Some(Self::Single),
            _ => None,
        }
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a sync job row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Credential/connection health state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Credentials valid, connection syncable
    Active,
    /// Token refresh failed; user must re-authorize before further calls
    Degraded,
    /// User disconnected; soft-disabled, never hard-deleted
    Disconnected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Degraded => "degraded",
            Self::Disconnected => "disconnected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "degraded" => Some(Self::Degraded),
            "disconnected" => Some(Self::Disconnected),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_round_trip() {
        for entity_type in EntityType::all() {
            assert_eq!(EntityType::parse(entity_type.as_str()), Some(entity_type));
        }
        assert_eq!(EntityType::parse("matters"), Some(EntityType::Matter));
        assert_eq!(EntityType::parse("invoice"), None);
    }

    #[test]
    fn test_entity_type_serde() {
        let json = serde_json::to_string(&EntityType::Matter).unwrap();
        assert_eq!(json, "\"matter\"");
        let parsed: EntityType = serde_json::from_str("\"task\"").unwrap();
        assert_eq!(parsed, EntityType::Task);
    }

    #[test]
    fn test_job_status_terminal() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::InProgress.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_string_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::InProgress,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        for status in [
            ConnectionStatus::Active,
            ConnectionStatus::Degraded,
            ConnectionStatus::Disconnected,
        ] {
            assert_eq!(ConnectionStatus::parse(status.as_str()), Some(status));
        }
    }
}
