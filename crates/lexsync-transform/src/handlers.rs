//! Per-entity-type handlers
//!
//! One handler per entity type carries everything type-specific the engine
//! needs: the remote collection path, the incremental filter parameter, and
//! the payload transform. Everything else operates on the type tag alone.

use crate::projection::{
    optional_i64, optional_string, require_datetime, require_i64, RecordProjection,
};
use lexsync_core::{EntityType, SyncResult};
use serde_json::Value;
use std::collections::HashMap;

type TransformFn = fn(&Value) -> SyncResult<RecordProjection>;

pub struct EntityHandler {
    entity_type: EntityType,
    collection_path: &'static str,
    updated_since_param: &'static str,
    transform: TransformFn,
}

impl EntityHandler {
    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    /// Remote collection path, relative to the API base URL.
    pub fn collection_path(&self) -> &'static str {
        self.collection_path
    }

    /// Query parameter the remote accepts for last-modified filtering.
    pub fn updated_since_param(&self) -> &'static str {
        self.updated_since_param
    }

    /// Transform a remote payload into a local projection.
    pub fn transform(&self, payload: &Value) -> SyncResult<RecordProjection> {
        (self.transform)(payload)
    }
}

/// Registry of handlers, one per entity type.
pub struct HandlerRegistry {
    handlers: HashMap<EntityType, EntityHandler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        let mut handlers = HashMap::new();
        handlers.insert(
            EntityType::Matter,
            EntityHandler {
                entity_type: EntityType::Matter,
                collection_path: "/api/v1/matters",
                updated_since_param: "updated_since",
                transform: transform_matter,
            },
        );
        handlers.insert(
            EntityType::Contact,
            EntityHandler {
                entity_type: EntityType::Contact,
                collection_path: "/api/v1/contacts",
                updated_since_param: "updated_since",
                transform: transform_contact,
            },
        );
        handlers.insert(
            EntityType::Activity,
            EntityHandler {
                entity_type: EntityType::Activity,
                collection_path: "/api/v1/activities",
                updated_since_param: "updated_since",
                transform: transform_activity,
            },
        );
        handlers.insert(
            EntityType::Task,
            EntityHandler {
                entity_type: EntityType::Task,
                collection_path: "/api/v1/tasks",
                updated_since_param: "updated_since",
                transform: transform_task,
            },
        );
        Self { handlers }
    }

    pub fn get(&self, entity_type: EntityType) -> &EntityHandler {
        // The constructor registers every EntityType variant
        &self.handlers[&entity_type]
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn transform_matter(payload: &Value) -> SyncResult<RecordProjection> {
    Ok(RecordProjection {
        remote_id: require_i64(payload, "id")?,
        entity_type: EntityType::Matter,
        display_name: optional_string(payload, "display_number")
            .or_else(|| optional_string(payload, "description")),
        parent_remote_id: optional_i64(payload, "client.id"),
        remote_updated_at: require_datetime(payload, "updated_at")?,
        data: payload.clone(),
    })
}

fn transform_contact(payload: &Value) -> SyncResult<RecordProjection> {
    Ok(RecordProjection {
        remote_id: require_i64(payload, "id")?,
        entity_type: EntityType::Contact,
        display_name: optional_string(payload, "name"),
        parent_remote_id: None,
        remote_updated_at: require_datetime(payload, "updated_at")?,
        data: payload.clone(),
    })
}

fn transform_activity(payload: &Value) -> SyncResult<RecordProjection> {
    Ok(RecordProjection {
        remote_id: require_i64(payload, "id")?,
        entity_type: EntityType::Activity,
        display_name: optional_string(payload, "description"),
        parent_remote_id: optional_i64(payload, "matter.id"),
        remote_updated_at: require_datetime(payload, "updated_at")?,
        data: payload.clone(),
    })
}

fn transform_task(payload: &Value) -> SyncResult<RecordProjection> {
    Ok(RecordProjection {
        remote_id: require_i64(payload, "id")?,
        entity_type: EntityType::Task,
        display_name: optional_string(payload, "name"),
        parent_remote_id: optional_i64(payload, "matter.id"),
        remote_updated_at: require_datetime(payload, "updated_at")?,
        data: payload.clone(),
    })
}
