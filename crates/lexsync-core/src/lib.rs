//! Core utilities and types shared across all Lexsync crates

pub mod api;
pub mod error;
pub mod jobs;
pub mod settings;
pub mod types;
mod encryption;

// Re-export commonly used types
pub use error::*;
pub use jobs::*;
pub use settings::*;
pub use types::*;

// Re-export external dependencies
pub use anyhow;
pub use async_trait;
pub use chrono;
pub use serde;
pub use serde_json;
pub use thiserror;
pub use tokio;
pub use tracing;
pub use uuid;
pub use encryption::EncryptionService;
