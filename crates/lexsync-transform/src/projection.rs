//! Local record projection and payload field access

use chrono::{DateTime, Utc};
use lexsync_core::{EntityType, SyncError, SyncResult, UtcDateTime};
use serde_json::Value;

/// Local projection of one remote entity, ready for upsert.
///
/// `remote_id` and `parent_remote_id` are remote natural keys and stay `i64`
/// end to end; they never pass through a float representation.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordProjection {
    pub remote_id: i64,
    pub entity_type: EntityType,
    pub display_name: Option<String>,
    pub parent_remote_id: Option<i64>,
    pub remote_updated_at: UtcDateTime,
    pub data: Value,
}

/// Look up a dotted path ("client.id") in a JSON payload.
fn lookup<'a>(payload: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = payload;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

pub(crate) fn require_i64(payload: &Value, field_path: &str) -> SyncResult<i64> {
    match lookup(payload, field_path) {
        Some(value) => value.as_i64().ok_or_else(|| SyncError::MalformedPayload {
            field_path: field_path.to_string(),
            detail: format!("expected integer, got {}", value),
        }),
        None => Err(SyncError::MalformedPayload {
            field_path: field_path.to_string(),
            detail: "required field missing".to_string(),
        }),
    }
}

pub(crate) fn require_datetime(payload: &Value, field_path: &str) -> SyncResult<UtcDateTime> {
    let raw = match lookup(payload, field_path) {
        Some(Value::String(raw)) => raw,
        Some(value) => {
            return Err(SyncError::MalformedPayload {
                field_path: field_path.to_string(),
                detail: format!("expected RFC 3339 timestamp string, got {}", value),
            })
        }
        None => {
            return Err(SyncError::MalformedPayload {
                field_path: field_path.to_string(),
                detail: "required field missing".to_string(),
            })
        }
    };

    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SyncError::MalformedPayload {
            field_path: field_path.to_string(),
            detail: format!("invalid timestamp: {}", e),
        })
}

/// Optional fields map to `None` when missing, null, or of the wrong type.
pub(crate) fn optional_i64(payload: &Value, field_path: &str) -> Option<i64> {
    lookup(payload, field_path).and_then(Value::as_i64)
}

pub(crate) fn optional_string(payload: &Value, field_path: &str) -> Option<String> {
    lookup(payload, field_path)
        .and_then(Value::as_str)
        .map(str::to_string)
}
