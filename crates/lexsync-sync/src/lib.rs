//! Sync orchestration API
//!
//! The control surface for batch syncs: launch jobs for a connection,
//! inspect their progress, and request cancellation. All actual work
//! happens on the worker pool; these endpoints only touch job rows.

mod handlers;
mod service;

pub use handlers::{configure_routes, SyncApiDoc};
pub use service::SyncOrchestrator;
