use async_trait::async_trait;
use lexsync_core::DBDateTime;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue::Set, ConnectionTrait, DbErr};
use serde::{Deserialize, Serialize};

/// Stored authorization linking a local user to their remote
/// practice-management account. One row per user per provider; soft-disabled
/// on disconnect, never hard-deleted.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "connections")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    pub provider: String,
    /// Remote account identifier. i64 so large remote ids round-trip exactly.
    #[sea_orm(column_type = "BigInteger")]
    pub remote_account_id: i64,
    /// AES-GCM encrypted access token
    pub access_token: String,
    /// AES-GCM encrypted refresh token
    pub refresh_token: String,
    pub token_expires_at: Option<DBDateTime>,
    /// active | degraded | disconnected
    pub status: String,
    /// Watermark: advanced to the sync start time only after a full job
    /// completes every page.
    pub last_synced_at: Option<DBDateTime>,
    /// Map of entity type -> remote webhook subscription id
    pub webhook_subscriptions: Option<Json>,
    pub created_at: DBDateTime,
    pub updated_at: DBDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id"
    )]
    User,
    #[sea_orm(has_many = "super::sync_jobs::Entity")]
    SyncJobs,
    #[sea_orm(has_many = "super::remote_records::Entity")]
    RemoteRecords,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::sync_jobs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SyncJobs.def()
    }
}

impl Related<super::remote_records::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RemoteRecords.def()
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
