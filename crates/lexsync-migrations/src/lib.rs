//! Database migrations for the Lexsync sync engine

pub use sea_orm_migration::prelude::*;

mod migration;

pub use migration::Migrator;
