use async_trait::async_trait;
use lexsync_core::DBDateTime;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue::Set, ConnectionTrait, DbErr};
use serde::{Deserialize, Serialize};

/// Durable record of one unit of sync work for a (connection, entity type)
/// key. Mutated only by the worker executing it; terminal on completed or
/// retries-exhausted failed.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "sync_jobs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub connection_id: i32,
    pub entity_type: String,
    /// full | incremental | single
    pub mode: String,
    /// pending | in_progress | completed | failed
    pub status: String,
    pub attempts: i32,
    /// Snapshot of the configured retry bound at enqueue time
    pub max_attempts: i32,
    /// Page checkpoint: opaque cursor of the next page to fetch. Retries
    /// resume here instead of restarting from scratch.
    pub cursor: Option<String>,
    pub pages_done: i32,
    pub records_upserted: i32,
    /// Target remote id for single-entity (webhook) jobs
    #[sea_orm(column_type = "BigInteger", nullable)]
    pub remote_id: Option<i64>,
    /// Webhook deletion events soft-delete instead of fetching
    pub deletion: bool,
    /// Cooperative cancellation, honored at page boundaries
    pub cancel_requested: bool,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub enqueued_at: DBDateTime,
    pub started_at: Option<DBDateTime>,
    pub finished_at: Option<DBDateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::connections::Entity",
        from = "Column::ConnectionId",
        to = "super::connections::Column::Id"
    )]
    Connection,
}

impl Related<super::connections::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Connection.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(mut self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        if insert {
            if self.enqueued_at.is_not_set() {
                self.enqueued_at = Set(chrono::Utc::now());
            }
            if self.status.is_not_set() {
                self.status = Set("pending".to_string());
            }
            if self.attempts.is_not_set() {
                self.attempts = Set(0);
            }
            if self.pages_done.is_not_set() {
                self.pages_done = Set(0);
            }
            if self.records_upserted.is_not_set() {
                self.records_upserted = Set(0);
            }
            if self.deletion.is_not_set() {
                self.deletion = Set(false);
            }
            if self.cancel_requested.is_not_set() {
                self.cancel_requested = Set(false);
            }
        }

        Ok(self)
    }
}
