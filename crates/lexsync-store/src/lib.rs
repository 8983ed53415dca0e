//! Persistence layer for synced records and connections

mod connections;
mod records;

pub use connections::ConnectionRepository;
pub use records::RecordRepository;
