//! HTTP client for the remote practice-management API
//!
//! Handles pagination, per-connection rate limiting, retry with exponential
//! backoff on throttling responses, and single-flight access token refresh.

pub mod backoff;
mod client;
mod limiter;
mod token;

pub use client::{Page, RemoteApi, RemoteApiClient};
pub use limiter::RateLimiter;
pub use token::TokenStore;
