//! Test utilities for database integration tests
//!
//! Repository and queue tests run against an in-memory sqlite database with
//! the full migration set applied, so uniqueness constraints and conflict
//! behavior match production schema.

use crate::DbConnection;
use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;

use lexsync_migrations::Migrator;

/// Create a fresh in-memory database with all migrations applied.
///
/// Each call returns an isolated database; tests never share state.
pub async fn setup_test_db() -> anyhow::Result<Arc<DbConnection>> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(Arc::new(db))
}
