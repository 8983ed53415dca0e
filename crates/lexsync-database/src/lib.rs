//! Database connection management for the Lexsync sync engine

mod connection;
pub mod test_utils;

pub use connection::{establish_connection, DbConnection};
