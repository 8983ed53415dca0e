//! Remote API client

use crate::backoff::backoff_delay;
use crate::limiter::RateLimiter;
use crate::token::TokenStore;
use async_trait::async_trait;
use lexsync_core::settings::{RateLimitSettings, RetrySettings};
use lexsync_core::{SyncError, SyncResult, UtcDateTime};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// One page of a remote collection listing.
#[derive(Debug, Clone)]
pub struct Page {
    pub records: Vec<Value>,
    pub next_cursor: Option<String>,
}

#[derive(Deserialize)]
struct CollectionResponse {
    data: Vec<Value>,
    #[serde(default)]
    meta: PageMeta,
}

#[derive(Deserialize, Default)]
struct PageMeta {
    next_cursor: Option<String>,
}

#[derive(Deserialize)]
struct ItemResponse {
    data: Value,
}

#[derive(Deserialize)]
struct SubscriptionResponse {
    id: i64,
}

/// Operations the engine performs against the remote API.
///
/// The executor and webhook registration depend on this trait rather than
/// the concrete client, so tests can script remote behavior.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Fetch one page of a collection listing.
    ///
    /// `updated_since_param` is the entity handler's query parameter name
    /// for incremental filtering; `updated_since` is omitted entirely for
    /// full syncs.
    async fn fetch_page(
        &self,
        connection_id: i32,
        collection_path: &str,
        updated_since_param: &str,
        cursor: Option<&str>,
        updated_since: Option<UtcDateTime>,
        page_size: u32,
    ) -> SyncResult<Page>;

    /// Fetch a single entity by its remote id.
    async fn fetch_single(
        &self,
        connection_id: i32,
        collection_path: &str,
        remote_id: i64,
    ) -> SyncResult<Value>;

    /// Register a webhook subscription for one entity type; returns the
    /// remote subscription id.
    async fn register_webhook(
        &self,
        connection_id: i32,
        entity_type: &str,
        callback_url: &str,
    ) -> SyncResult<i64>;
}

/// Client for the remote practice-management API.
///
/// Every outbound call waits on the per-connection rate limiter first. A 429
/// response retries with exponential backoff up to the configured attempt
/// limit; a 401 triggers a single-flight token refresh per connection and
/// one retry with the new token.
pub struct RemoteApiClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenStore>,
    limiter: RateLimiter,
    refresh_locks: Mutex<HashMap<i32, Arc<Mutex<()>>>>,
    retry: RetrySettings,
}

impl RemoteApiClient {
    pub fn new(
        base_url: String,
        tokens: Arc<dyn TokenStore>,
        retry: RetrySettings,
        rate_limit: RateLimitSettings,
    ) -> SyncResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent("Lexsync-Engine/1.0")
            .timeout(Duration::from_secs(retry.request_timeout_secs))
            .build()
            .map_err(|e| SyncError::Internal(e.into()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
            limiter: RateLimiter::new(rate_limit.burst, rate_limit.per_second),
            refresh_locks: Mutex::new(HashMap::new()),
            retry,
        })
    }

    /// Send a request, handling throttling and expired tokens.
    async fn execute<F>(&self, connection_id: i32, build: F) -> SyncResult<Value>
    where
        F: Fn(&str) -> reqwest::RequestBuilder + Send + Sync,
    {
        let mut attempts: u32 = 0;
        let mut refreshed = false;

        loop {
            self.limiter.acquire(connection_id).await;
            let token = self.tokens.access_token(connection_id).await?;

            let response = match build(&token).send().await {
                Ok(response) => response,
                Err(e) if e.is_timeout() => {
                    return Err(SyncError::Timeout {
                        timeout_secs: self.retry.request_timeout_secs,
                    })
                }
                Err(e) => {
                    return Err(SyncError::TransientRemote {
                        detail: format!("request failed: {}", e),
                    })
                }
            };

            match response.status() {
                status if status.is_success() => {
                    return response.json().await.map_err(|e| SyncError::TransientRemote {
                        detail: format!("failed to read response body: {}", e),
                    });
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    attempts += 1;
                    if attempts >= self.retry.max_attempts {
                        return Err(SyncError::RateLimitExceeded { attempts });
                    }
                    let delay = backoff_delay(
                        attempts,
                        self.retry.backoff_base_ms,
                        self.retry.backoff_cap_ms,
                    );
                    warn!(
                        connection_id,
                        attempts,
                        delay_ms = delay.as_millis() as u64,
                        "remote throttled request, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                StatusCode::UNAUTHORIZED => {
                    if refreshed {
                        return Err(SyncError::ReauthorizationRequired { connection_id });
                    }
                    self.refresh_single_flight(connection_id, &token).await?;
                    refreshed = true;
                }
                status => {
                    let detail = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "unknown error".to_string());
                    return Err(SyncError::TransientRemote {
                        detail: format!("unexpected status {}: {}", status, detail),
                    });
                }
            }
        }
    }

    /// Refresh a connection's token at most once across concurrent callers.
    ///
    /// Callers that lose the race find the token already rotated under the
    /// lock and skip the remote call.
    async fn refresh_single_flight(&self, connection_id: i32, stale_token: &str) -> SyncResult<()> {
        let lock = {
            let mut locks = self.refresh_locks.lock().await;
            locks
                .entry(connection_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = lock.lock().await;

        let current = self.tokens.access_token(connection_id).await?;
        if current != stale_token {
            debug!(connection_id, "token already refreshed by another task");
            return Ok(());
        }

        info!(connection_id, "refreshing expired access token");
        self.tokens.refresh(connection_id).await?;
        Ok(())
    }
}

#[async_trait]
impl RemoteApi for RemoteApiClient {
    async fn fetch_page(
        &self,
        connection_id: i32,
        collection_path: &str,
        updated_since_param: &str,
        cursor: Option<&str>,
        updated_since: Option<UtcDateTime>,
        page_size: u32,
    ) -> SyncResult<Page> {
        let url = format!("{}{}", self.base_url, collection_path);
        let mut query: Vec<(String, String)> = vec![("limit".into(), page_size.to_string())];
        if let Some(cursor) = cursor {
            query.push(("cursor".into(), cursor.to_string()));
        }
        if let Some(since) = updated_since {
            query.push((updated_since_param.to_string(), since.to_rfc3339()));
        }

        let body = self
            .execute(connection_id, |token| {
                self.http.get(&url).query(&query).bearer_auth(token)
            })
            .await?;

        let page: CollectionResponse = serde_json::from_value(body)?;
        debug!(
            connection_id,
            collection_path,
            records = page.data.len(),
            has_next = page.meta.next_cursor.is_some(),
            "fetched collection page"
        );

        Ok(Page {
            records: page.data,
            next_cursor: page.meta.next_cursor,
        })
    }

    async fn fetch_single(
        &self,
        connection_id: i32,
        collection_path: &str,
        remote_id: i64,
    ) -> SyncResult<Value> {
        let url = format!("{}{}/{}", self.base_url, collection_path, remote_id);

        let body = self
            .execute(connection_id, |token| {
                self.http.get(&url).bearer_auth(token)
            })
            .await?;

        let item: ItemResponse = serde_json::from_value(body)?;
        Ok(item.data)
    }

    async fn register_webhook(
        &self,
        connection_id: i32,
        entity_type: &str,
        callback_url: &str,
    ) -> SyncResult<i64> {
        let url = format!("{}/api/v1/webhooks", self.base_url);
        let payload = serde_json::json!({
            "url": callback_url,
            "entity_type": entity_type,
            "events": ["created", "updated", "deleted"],
        });

        let body = self
            .execute(connection_id, |token| {
                self.http.post(&url).json(&payload).bearer_auth(token)
            })
            .await?;

        let subscription: SubscriptionResponse = serde_json::from_value(body)?;
        info!(
            connection_id,
            entity_type,
            subscription_id = subscription.id,
            "registered webhook subscription"
        );
        Ok(subscription.id)
    }
}
