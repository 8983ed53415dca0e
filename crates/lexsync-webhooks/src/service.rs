//! Webhook delivery validation, routing, and registration

use crate::events::{RemoteEventType, WebhookEnvelope};
use hmac::{Hmac, Mac};
use lexsync_client::RemoteApi;
use lexsync_core::uuid::Uuid;
use lexsync_core::{EntityType, SyncError, SyncResult};
use lexsync_metrics::MetricsRecorder;
use lexsync_queue::SyncQueueService;
use lexsync_store::ConnectionRepository;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

type HmacSha256 = Hmac<Sha256>;

/// What happened to an accepted (signature-valid) delivery.
///
/// Each delivery gets a locally generated id that ties the acknowledgement
/// to the log lines it produced; the provider's retries get fresh ids.
#[derive(Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// A single-entity job was written and enqueued
    Enqueued { delivery_id: Uuid, job_id: i32 },
    /// Acknowledged but dropped: unknown event type or no syncable connection
    Discarded { delivery_id: Uuid },
}

/// Validates inbound deliveries and turns them into narrow sync jobs.
pub struct WebhookService {
    provider: String,
    secret: String,
    callback_base_url: String,
    connections: Arc<ConnectionRepository>,
    queue: SyncQueueService,
    client: Arc<dyn RemoteApi>,
    metrics: MetricsRecorder,
}

impl WebhookService {
    pub fn new(
        provider: String,
        secret: String,
        callback_base_url: String,
        connections: Arc<ConnectionRepository>,
        queue: SyncQueueService,
        client: Arc<dyn RemoteApi>,
        metrics: MetricsRecorder,
    ) -> Self {
        Self {
            provider,
            secret,
            callback_base_url,
            connections,
            queue,
            client,
            metrics,
        }
    }

    /// Verify the hex HMAC-SHA256 signature over the exact raw body bytes.
    ///
    /// Comparison is constant-time via `Mac::verify_slice`. Any failure mode
    /// (unknown provider, missing or undecodable header, wrong digest)
    /// collapses into the same `SignatureInvalid`.
    pub fn verify_signature(
        &self,
        provider: &str,
        body: &[u8],
        signature: Option<&str>,
    ) -> SyncResult<()> {
        if provider != self.provider {
            return Err(SyncError::SignatureInvalid);
        }
        let signature = signature.ok_or(SyncError::SignatureInvalid)?;
        let digest = hex::decode(signature).map_err(|_| SyncError::SignatureInvalid)?;

        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| SyncError::SignatureInvalid)?;
        mac.update(body);
        mac.verify_slice(&digest)
            .map_err(|_| SyncError::SignatureInvalid)
    }

    /// Process one delivery after signature validation.
    ///
    /// The durable job row is written and the message enqueued before the
    /// caller acknowledges; the actual remote fetch happens on a worker.
    /// Duplicate deliveries are harmless: the resulting upserts converge on
    /// one row.
    pub async fn handle_delivery(
        &self,
        provider: &str,
        body: &[u8],
        signature: Option<&str>,
    ) -> SyncResult<DeliveryOutcome> {
        if let Err(e) = self.verify_signature(provider, body, signature) {
            warn!(provider, "rejected webhook delivery with invalid signature");
            self.metrics.record_event("webhook.rejected").await;
            return Err(e);
        }
        let delivery_id = Uuid::new_v4();
        self.metrics.record_event("webhook.received").await;

        let envelope: WebhookEnvelope =
            serde_json::from_slice(body).map_err(|e| SyncError::MalformedPayload {
                field_path: "body".to_string(),
                detail: format!("unparseable delivery envelope: {}", e),
            })?;

        let Some(event) = RemoteEventType::parse(&envelope.event_type) else {
            debug!(
                delivery_id = %delivery_id,
                event_type = %envelope.event_type,
                "unknown webhook event type, discarding"
            );
            self.metrics.record_event("webhook.discarded").await;
            return Ok(DeliveryOutcome::Discarded { delivery_id });
        };

        let connection = match self
            .connections
            .find_active_by_user(envelope.user_id, &self.provider)
            .await
        {
            Ok(connection) => connection,
            Err(SyncError::ConnectionNotFound { detail }) => {
                // Nothing to sync into; acknowledging stops provider retries
                debug!(
                    delivery_id = %delivery_id,
                    user_id = envelope.user_id,
                    detail,
                    "delivery without connection, discarding"
                );
                self.metrics.record_event("webhook.discarded").await;
                return Ok(DeliveryOutcome::Discarded { delivery_id });
            }
            Err(e) => return Err(e),
        };

        let row = self
            .queue
            .launch_single_entity(
                connection.id,
                event.entity_type(),
                envelope.entity_id,
                event.is_deletion(),
            )
            .await?;

        info!(
            delivery_id = %delivery_id,
            job_id = row.id,
            event = %event,
            entity_id = envelope.entity_id,
            "webhook delivery enqueued"
        );
        self.metrics.record_event("webhook.accepted").await;
        Ok(DeliveryOutcome::Enqueued {
            delivery_id,
            job_id: row.id,
        })
    }

    /// One-time webhook registration for a user's active connection.
    ///
    /// Registers a callback per entity type with the remote and stores the
    /// returned subscription ids on the connection. A missing connection is
    /// an error with no side effects.
    pub async fn register(&self, user_id: i32) -> SyncResult<HashMap<String, i64>> {
        let connection = self
            .connections
            .find_active_by_user(user_id, &self.provider)
            .await?;

        let callback_url = format!(
            "{}/webhooks/{}",
            self.callback_base_url.trim_end_matches('/'),
            self.provider
        );

        let mut subscriptions = HashMap::new();
        for entity_type in EntityType::all() {
            let subscription_id = self
                .client
                .register_webhook(connection.id, entity_type.as_str(), &callback_url)
                .await?;
            subscriptions.insert(entity_type.as_str().to_string(), subscription_id);
        }

        self.connections
            .store_webhook_subscriptions(connection.id, &subscriptions)
            .await?;

        info!(
            user_id,
            connection_id = connection.id,
            count = subscriptions.len(),
            "webhook subscriptions registered"
        );
        Ok(subscriptions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    fn bare_service() -> WebhookService {
        struct NoRemote;
        #[async_trait::async_trait]
        impl RemoteApi for NoRemote {
            async fn fetch_page(
                &self,
                _: i32,
                _: &str,
                _: &str,
                _: Option<&str>,
                _: Option<lexsync_core::UtcDateTime>,
                _: u32,
            ) -> SyncResult<lexsync_client::Page> {
                unimplemented!()
            }
            async fn fetch_single(
                &self,
                _: i32,
                _: &str,
                _: i64,
            ) -> SyncResult<serde_json::Value> {
                unimplemented!()
            }
            async fn register_webhook(&self, _: i32, _: &str, _: &str) -> SyncResult<i64> {
                unimplemented!()
            }
        }

        // Signature checks need none of the async collaborators; wire in
        // inert ones.
        let db_stub = std::sync::Arc::new(sea_orm_stub());
        let encryption = Arc::new(
            lexsync_core::EncryptionService::new("0123456789abcdef0123456789abcdef").unwrap(),
        );
        let connections =
            Arc::new(ConnectionRepository::new(db_stub, encryption, "http://remote.test").unwrap());
        let jobs = Arc::new(lexsync_queue::SyncJobRepository::new(sea_orm_stub_arc()));
        let (sender, _receiver) = tokio::sync::mpsc::channel(1);
        let queue = SyncQueueService::new(sender, jobs, 5);
        WebhookService::new(
            "practicehub".to_string(),
            "topsecret".to_string(),
            "http://localhost:8080".to_string(),
            connections,
            queue,
            Arc::new(NoRemote),
            MetricsRecorder::new("redis://127.0.0.1:1/", 7).unwrap(),
        )
    }

    fn sea_orm_stub() -> sea_orm::DatabaseConnection {
        sea_orm::DatabaseConnection::Disconnected
    }

    fn sea_orm_stub_arc() -> Arc<sea_orm::DatabaseConnection> {
        Arc::new(sea_orm::DatabaseConnection::Disconnected)
    }

    #[test]
    fn test_valid_signature_accepted() {
        let service = bare_service();
        let body = br#"{"event_type":"matter.updated"}"#;
        let signature = sign("topsecret", body);
        assert!(service
            .verify_signature("practicehub", body, Some(&signature))
            .is_ok());
    }

    #[test]
    fn test_tampered_body_rejected() {
        let service = bare_service();
        let signature = sign("topsecret", br#"{"event_type":"matter.updated"}"#);
        let result =
            service.verify_signature("practicehub", br#"{"event_type":"matter.deleted"}"#, Some(&signature));
        assert!(matches!(result, Err(SyncError::SignatureInvalid)));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let service = bare_service();
        let body = br#"{"event_type":"matter.updated"}"#;
        let signature = sign("othersecret", body);
        let result = service.verify_signature("practicehub", body, Some(&signature));
        assert!(matches!(result, Err(SyncError::SignatureInvalid)));
    }

    #[test]
    fn test_missing_or_malformed_signature_rejected() {
        let service = bare_service();
        let body = b"{}";
        assert!(matches!(
            service.verify_signature("practicehub", body, None),
            Err(SyncError::SignatureInvalid)
        ));
        assert!(matches!(
            service.verify_signature("practicehub", body, Some("not-hex!")),
            Err(SyncError::SignatureInvalid)
        ));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let service = bare_service();
        let body = b"{}";
        let signature = sign("topsecret", body);
        let result = service.verify_signature("othervendor", body, Some(&signature));
        assert!(matches!(result, Err(SyncError::SignatureInvalid)));
    }
}
