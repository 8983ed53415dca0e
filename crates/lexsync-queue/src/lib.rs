//! Durable job queue and worker pool
//!
//! Every job exists as a `sync_jobs` row before its in-process message is
//! sent, so a crash between enqueue and execution loses nothing: startup
//! recovery re-enqueues whatever rows are still pending.

mod executor;
mod locks;
mod repository;
mod service;
mod worker;

pub use executor::JobExecutor;
pub use locks::KeyLockMap;
pub use repository::SyncJobRepository;
pub use service::SyncQueueService;
pub use worker::WorkerPool;
