//! Database connection management

use lexsync_core::{SyncError, SyncResult};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;

use lexsync_migrations::Migrator;

pub type DbConnection = DatabaseConnection;

pub async fn establish_connection(database_url: &str) -> SyncResult<Arc<DbConnection>> {
    let mut opt = ConnectOptions::new(database_url);
    opt.max_connections(50).min_connections(2);

    let db = Database::connect(opt)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

    // Run migrations
    Migrator::up(&db, None)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

    Ok(Arc::new(db))
}
