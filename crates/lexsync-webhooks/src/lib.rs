//! Inbound webhook receiver and subscription registration
//!
//! Deliveries are validated against an HMAC signature over the exact raw
//! body bytes, translated into narrow single-entity jobs, and acknowledged
//! immediately. No remote calls happen on the delivery path.

mod events;
mod handlers;
mod service;

pub use events::{RemoteEventType, WebhookEnvelope};
pub use handlers::{configure_routes, WebhooksApiDoc};
pub use service::{DeliveryOutcome, WebhookService};
