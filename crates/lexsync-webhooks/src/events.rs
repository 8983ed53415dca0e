//! Remote webhook event types and the delivery envelope

use lexsync_core::{EntityType, UtcDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Event types the remote provider delivers.
///
/// Unknown event strings are not an error: the receiver acknowledges and
/// discards them so new remote event types never break ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteEventType {
    MatterCreated,
    MatterUpdated,
    MatterDeleted,
    ContactCreated,
    ContactUpdated,
    ContactDeleted,
    ActivityCreated,
    ActivityUpdated,
    ActivityDeleted,
    TaskCreated,
    TaskUpdated,
    TaskDeleted,
}

impl RemoteEventType {
    pub fn all() -> Vec<RemoteEventType> {
        vec![
            RemoteEventType::MatterCreated,
            RemoteEventType::MatterUpdated,
            RemoteEventType::MatterDeleted,
            RemoteEventType::ContactCreated,
            RemoteEventType::ContactUpdated,
            RemoteEventType::ContactDeleted,
            RemoteEventType::ActivityCreated,
            RemoteEventType::ActivityUpdated,
            RemoteEventType::ActivityDeleted,
            RemoteEventType::TaskCreated,
            RemoteEventType::TaskUpdated,
            RemoteEventType::TaskDeleted,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteEventType::MatterCreated => "matter.created",
            RemoteEventType::MatterUpdated => "matter.updated",
            RemoteEventType::MatterDeleted => "matter.deleted",
            RemoteEventType::ContactCreated => "contact.created",
            RemoteEventType::ContactUpdated => "contact.updated",
            RemoteEventType::ContactDeleted => "contact.deleted",
            RemoteEventType::ActivityCreated => "activity.created",
            RemoteEventType::ActivityUpdated => "activity.updated",
            RemoteEventType::ActivityDeleted => "activity.deleted",
            RemoteEventType::TaskCreated => "task.created",
            RemoteEventType::TaskUpdated => "task.updated",
            RemoteEventType::TaskDeleted => "task.deleted",
        }
    }

    pub fn parse(s: &str) -> Option<RemoteEventType> {
        Self::all().into_iter().find(|event| event.as_str() == s)
    }

    /// The local entity type this event maps onto.
    pub fn entity_type(&self) -> EntityType {
        match self {
            RemoteEventType::MatterCreated
            | RemoteEventType::MatterUpdated
            | RemoteEventType::MatterDeleted => EntityType::Matter,
            RemoteEventType::ContactCreated
            | RemoteEventType::ContactUpdated
            | RemoteEventType::ContactDeleted => EntityType::Contact,
            RemoteEventType::ActivityCreated
            | RemoteEventType::ActivityUpdated
            | RemoteEventType::ActivityDeleted => EntityType::Activity,
            RemoteEventType::TaskCreated
            | RemoteEventType::TaskUpdated
            | RemoteEventType::TaskDeleted => EntityType::Task,
        }
    }

    /// Deletion events soft-delete locally instead of fetching.
    pub fn is_deletion(&self) -> bool {
        matches!(
            self,
            RemoteEventType::MatterDeleted
                | RemoteEventType::ContactDeleted
                | RemoteEventType::ActivityDeleted
                | RemoteEventType::TaskDeleted
        )
    }
}

impl fmt::Display for RemoteEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parsed delivery body. The signature is computed over the raw bytes this
/// was parsed from, never over a re-serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    pub event_type: String,
    /// Remote entity id; i64 so large ids survive exactly
    pub entity_id: i64,
    pub user_id: i32,
    pub timestamp: UtcDateTime,
}
