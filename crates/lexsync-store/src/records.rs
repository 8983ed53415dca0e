//! Conflict-aware record persistence

use lexsync_core::{SyncError, SyncResult};
use lexsync_entities::remote_records;
use lexsync_transform::RecordProjection;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use std::sync::Arc;
use tracing::debug;

/// Repository for local projections of remote entities.
///
/// Writes go through `INSERT ... ON CONFLICT (connection_id, remote_id)
/// DO UPDATE`, so concurrent upserts of the same natural key resolve in the
/// database rather than in application code.
pub struct RecordRepository {
    db: Arc<DatabaseConnection>,
}

impl RecordRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Insert or update one record by its natural key.
    ///
    /// Repeated upserts of the same (connection, remote id) leave exactly one
    /// row with last-write-wins field values. An upsert also reactivates a
    /// soft-deleted record, since the remote evidently still has it.
    pub async fn upsert(
        &self,
        connection_id: i32,
        projection: &RecordProjection,
    ) -> SyncResult<remote_records::Model> {
        let now = chrono::Utc::now();
        let model = remote_records::ActiveModel {
            connection_id: Set(connection_id),
            remote_id: Set(projection.remote_id),
            entity_type: Set(projection.entity_type.as_str().to_string()),
            display_name: Set(projection.display_name.clone()),
            parent_remote_id: Set(projection.parent_remote_id),
            data: Set(projection.data.clone()),
            remote_updated_at: Set(projection.remote_updated_at),
            status: Set("active".to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        remote_records::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    remote_records::Column::ConnectionId,
                    remote_records::Column::RemoteId,
                ])
                .update_columns([
                    remote_records::Column::DisplayName,
                    remote_records::Column::ParentRemoteId,
                    remote_records::Column::Data,
                    remote_records::Column::RemoteUpdatedAt,
                    remote_records::Column::Status,
                    remote_records::Column::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec(self.db.as_ref())
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        self.find(connection_id, projection.remote_id)
            .await?
            .ok_or_else(|| SyncError::Database("upserted row not found".to_string()))
    }

    /// Mark a record deleted without removing the row.
    ///
    /// A deletion event for a record we never synced is a no-op.
    pub async fn soft_delete(&self, connection_id: i32, remote_id: i64) -> SyncResult<()> {
        let Some(record) = self.find(connection_id, remote_id).await? else {
            debug!(connection_id, remote_id, "deletion for unknown record, ignoring");
            return Ok(());
        };

        let mut model: remote_records::ActiveModel = record.into();
        model.status = Set("deleted".to_string());
        model.updated_at = Set(chrono::Utc::now());
        remote_records::Entity::update(model)
            .exec(self.db.as_ref())
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(())
    }

    pub async fn find(
        &self,
        connection_id: i32,
        remote_id: i64,
    ) -> SyncResult<Option<remote_records::Model>> {
        remote_records::Entity::find()
            .filter(remote_records::Column::ConnectionId.eq(connection_id))
            .filter(remote_records::Column::RemoteId.eq(remote_id))
            .one(self.db.as_ref())
            .await
            .map_err(|e| SyncError::Database(e.to_string()))
    }
}
