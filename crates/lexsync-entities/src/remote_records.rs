use async_trait::async_trait;
use lexsync_core::DBDateTime;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue::Set, ConnectionTrait, DbErr};
use serde::{Deserialize, Serialize};

/// Local projection of a remote entity (matter, contact, activity, task).
///
/// The remote id is the natural key: (connection_id, remote_id) carries a
/// uniqueness constraint and is the conflict target for upserts. The
/// surrogate `id` never leaves this system. Deletions are soft (`status` =
/// "deleted") to preserve history.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "remote_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub connection_id: i32,
    /// Remote identifier, exact. Stored as a 64-bit integer end to end so
    /// ids beyond 2^53 never pass through a float.
    #[sea_orm(column_type = "BigInteger")]
    pub remote_id: i64,
    pub entity_type: String,
    pub display_name: Option<String>,
    /// Foreign natural key to a parent record (e.g. a task's matter),
    /// deliberately not a local foreign key: the parent may not be synced yet.
    #[sea_orm(column_type = "BigInteger", nullable)]
    pub parent_remote_id: Option<i64>,
    /// Full transformed projection of the remote payload
    pub data: Json,
    pub remote_updated_at: DBDateTime,
    /// active | deleted
    pub status: String,
    pub created_at: DBDateTime,
    pub updated_at: DBDateTime,
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
        let now = chrono::Utc::now();

        if insert {
            if self.created_at.is_not_set() {
                self.created_at = Set(now);
            }
            if self.updated_at.is_not_set() {
                self.updated_at = Set(now);
            }
            if self.status.is_not_set() {
                self.status = Set("active".to_string());
            }
        } else {
            self.updated_at = Set(now);
        }

        Ok(self)
    }
}
