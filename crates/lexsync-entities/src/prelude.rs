pub use super::connections::Entity as Connections;
pub use super::remote_records::Entity as RemoteRecords;
pub use super::sync_jobs::Entity as SyncJobs;
pub use super::users::Entity as Users;
