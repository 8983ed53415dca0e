pub mod connections;
pub mod remote_records;
pub mod sync_jobs;
pub mod users;

pub mod prelude;
