//! Operational metrics on redis
//!
//! Counters live in time-bucketed, expiring keys and are written with atomic
//! increments only. Recording is best-effort: a metrics outage must never
//! fail a sync or webhook path.

mod handlers;
mod recorder;

pub use handlers::{configure_routes, MetricsApiDoc};
pub use recorder::{MetricsRecorder, MetricsSummary};
