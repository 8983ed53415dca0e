//! Payload transformation for remote entities
//!
//! Pure functions from remote API payloads to local record projections.
//! No network calls, no database access; referential fields are carried as
//! remote natural keys.

mod handlers;
mod projection;

pub use handlers::{EntityHandler, HandlerRegistry};
pub use projection::RecordProjection;
