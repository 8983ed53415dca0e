use sea_orm_migration::prelude::*;

/// Initial schema: users, connections, sync_jobs, remote_records.
///
/// The unique index on remote_records (connection_id, remote_id) is the
/// cross-process correctness guarantee for concurrent upserts; everything
/// else in the engine treats it as the single source of truth for
/// mutual exclusion.
#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create users table
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("users"))
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Alias::new("id"))
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Alias::new("name")).string().not_null())
                    .col(
                        ColumnDef::new(Alias::new("email"))
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("created_at"))
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("updated_at"))
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Create connections table
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("connections"))
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Alias::new("id"))
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Alias::new("user_id")).integer().not_null())
                    .col(ColumnDef::new(Alias::new("provider")).string().not_null())
                    .col(
                        ColumnDef::new(Alias::new("remote_account_id"))
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("access_token"))
                            .text()
                            .not_null()
                            .comment("AES-GCM encrypted"),
                    )
                    .col(
                        ColumnDef::new(Alias::new("refresh_token"))
                            .text()
                            .not_null()
                            .comment("AES-GCM encrypted"),
                    )
                    .col(
                        ColumnDef::new(Alias::new("token_expires_at"))
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("status"))
                            .string()
                            .not_null()
                            .default("active"),
                    )
                    .col(
                        ColumnDef::new(Alias::new("last_synced_at"))
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("webhook_subscriptions"))
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("created_at"))
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("updated_at"))
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_connections_user")
                            .from(Alias::new("connections"), Alias::new("user_id"))
                            .to(Alias::new("users"), Alias::new("id")),
                    )
                    .to_owned(),
            )
            .await?;

        // One connection per user per provider
        manager
            .create_index(
                Index::create()
                    .name("idx_connections_user_provider")
                    .table(Alias::new("connections"))
                    .col(Alias::new("user_id"))
                    .col(Alias::new("provider"))
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Create sync_jobs table
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("sync_jobs"))
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Alias::new("id"))
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("connection_id"))
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("entity_type"))
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Alias::new("mode")).string().not_null())
                    .col(
                        ColumnDef::new(Alias::new("status"))
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(Alias::new("attempts"))
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Alias::new("max_attempts"))
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Alias::new("cursor")).string().null())
                    .col(
                        ColumnDef::new(Alias::new("pages_done"))
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Alias::new("records_upserted"))
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Alias::new("remote_id")).big_integer().null())
                    .col(
                        ColumnDef::new(Alias::new("deletion"))
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Alias::new("cancel_requested"))
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Alias::new("error_code")).string().null())
                    .col(ColumnDef::new(Alias::new("error_message")).text().null())
                    .col(
                        ColumnDef::new(Alias::new("enqueued_at"))
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("started_at"))
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("finished_at"))
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_sync_jobs_connection")
                            .from(Alias::new("sync_jobs"), Alias::new("connection_id"))
                            .to(Alias::new("connections"), Alias::new("id")),
                    )
                    .to_owned(),
            )
            .await?;

        // Workers scan for pending work on startup recovery
        manager
            .create_index(
                Index::create()
                    .name("idx_sync_jobs_status")
                    .table(Alias::new("sync_jobs"))
                    .col(Alias::new("status"))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sync_jobs_connection_entity")
                    .table(Alias::new("sync_jobs"))
                    .col(Alias::new("connection_id"))
                    .col(Alias::new("entity_type"))
                    .to_owned(),
            )
            .await?;

        // Create remote_records table
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("remote_records"))
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Alias::new("id"))
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("connection_id"))
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("remote_id"))
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("entity_type"))
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Alias::new("display_name")).string().null())
                    .col(
                        ColumnDef::new(Alias::new("parent_remote_id"))
                            .big_integer()
                            .null(),
                    )
                    .col(ColumnDef::new(Alias::new("data")).json_binary().not_null())
                    .col(
                        ColumnDef::new(Alias::new("remote_updated_at"))
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("status"))
                            .string()
                            .not_null()
                            .default("active"),
                    )
                    .col(
                        ColumnDef::new(Alias::new("created_at"))
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("updated_at"))
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_remote_records_connection")
                            .from(Alias::new("remote_records"), Alias::new("connection_id"))
                            .to(Alias::new("connections"), Alias::new("id")),
                    )
                    .to_owned(),
            )
            .await?;

        // The upsert conflict target. Concurrent writers for the same
        // natural key resolve here, not in application code.
        manager
            .create_index(
                Index::create()
                    .name("idx_remote_records_natural_key")
                    .table(Alias::new("remote_records"))
                    .col(Alias::new("connection_id"))
                    .col(Alias::new("remote_id"))
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_remote_records_entity_type")
                    .table(Alias::new("remote_records"))
                    .col(Alias::new("connection_id"))
                    .col(Alias::new("entity_type"))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Alias::new("remote_records")).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Alias::new("sync_jobs")).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Alias::new("connections")).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Alias::new("users")).to_owned())
            .await?;
        Ok(())
    }
}
