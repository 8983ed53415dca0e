//! HTTP surface for webhook ingestion and registration

use crate::service::{DeliveryOutcome, WebhookService};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use lexsync_core::api::ApiError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use utoipa::{OpenApi, ToSchema};

#[derive(OpenApi)]
#[openapi(
    paths(receive_webhook, register_webhooks),
    components(schemas(DeliveryResponse, RegistrationResponse)),
    tags((name = "webhooks", description = "Inbound delivery and subscription registration"))
)]
pub struct WebhooksApiDoc;

const SIGNATURE_HEADER: &str = "x-signature";

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeliveryResponse {
    /// accepted | discarded
    pub status: String,
    /// Locally generated id correlating this acknowledgement with log lines
    pub delivery_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegistrationResponse {
    /// Entity type -> remote subscription id
    pub subscriptions: HashMap<String, i64>,
}

/// Receive one webhook delivery.
///
/// The body is taken as raw bytes: the signature covers the exact wire
/// bytes, so parsing must happen after verification, never before.
#[utoipa::path(
    post,
    path = "/webhooks/{provider}",
    params(("provider" = String, Path, description = "Provider tag the delivery claims")),
    request_body(content = Vec<u8>, content_type = "application/json"),
    responses(
        (status = 202, description = "Delivery acknowledged", body = DeliveryResponse),
        (status = 401, description = "Signature invalid or unknown provider"),
        (status = 400, description = "Signed but unparseable envelope"),
    ),
    tag = "webhooks"
)]
pub async fn receive_webhook(
    State(service): State<Arc<WebhookService>>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<DeliveryResponse>), ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let outcome = service
        .handle_delivery(&provider, &body, signature)
        .await?;

    let response = match outcome {
        DeliveryOutcome::Enqueued {
            delivery_id,
            job_id,
        } => DeliveryResponse {
            status: "accepted".to_string(),
            delivery_id: delivery_id.to_string(),
            job_id: Some(job_id),
        },
        DeliveryOutcome::Discarded { delivery_id } => DeliveryResponse {
            status: "discarded".to_string(),
            delivery_id: delivery_id.to_string(),
            job_id: None,
        },
    };
    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// Register webhook subscriptions for a user's active connection.
#[utoipa::path(
    post,
    path = "/webhooks/register/{user_id}",
    params(("user_id" = i32, Path, description = "Local user id")),
    responses(
        (status = 200, description = "Subscriptions registered", body = RegistrationResponse),
        (status = 404, description = "No active connection for the user"),
    ),
    tag = "webhooks"
)]
pub async fn register_webhooks(
    State(service): State<Arc<WebhookService>>,
    Path(user_id): Path<i32>,
) -> Result<Json<RegistrationResponse>, ApiError> {
    let subscriptions = service.register(user_id).await?;
    Ok(Json(RegistrationResponse { subscriptions }))
}

pub fn configure_routes() -> Router<Arc<WebhookService>> {
    Router::new()
        .route("/webhooks/{provider}", post(receive_webhook))
        .route("/webhooks/register/{user_id}", post(register_webhooks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use hmac::{Hmac, Mac};
    use http_body_util::BodyExt;
    use lexsync_client::RemoteApi;
    use lexsync_core::{EncryptionService, SyncResult};
    use lexsync_database::test_utils::setup_test_db;
    use lexsync_entities::{connections, users};
    use lexsync_metrics::MetricsRecorder;
    use lexsync_queue::{SyncJobRepository, SyncQueueService};
    use lexsync_store::ConnectionRepository;
    use sea_orm::{ActiveModelTrait, ActiveValue::Set};
    use sha2::Sha256;
    use std::sync::atomic::{AtomicI64, Ordering};
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    const SECRET: &str = "topsecret";

    struct FakeRemote {
        next_subscription: AtomicI64,
    }

    #[async_trait::async_trait]
    impl RemoteApi for FakeRemote {
        async fn fetch_page(
            &self,
            _: i32,
            _: &str,
            _: &str,
            _: Option<&str>,
            _: Option<lexsync_core::UtcDateTime>,
            _: u32,
        ) -> SyncResult<lexsync_client::Page> {
            unimplemented!("not used by webhook handlers")
        }

        async fn fetch_single(&self, _: i32, _: &str, _: i64) -> SyncResult<serde_json::Value> {
            unimplemented!("not used by webhook handlers")
        }

        async fn register_webhook(&self, _: i32, _: &str, _: &str) -> SyncResult<i64> {
            Ok(self.next_subscription.fetch_add(1, Ordering::SeqCst))
        }
    }

    struct Setup {
        app: Router,
        jobs: Arc<SyncJobRepository>,
        connections: Arc<ConnectionRepository>,
        receiver: mpsc::Receiver<lexsync_core::Job>,
        user_id: i32,
    }

    async fn setup(seed_connection: bool) -> anyhow::Result<Setup> {
        let db = setup_test_db().await?;

        let user = users::ActiveModel {
            name: Set("Test User".to_string()),
            email: Set("test@example.com".to_string()),
            ..Default::default()
        }
        .insert(db.as_ref())
        .await?;

        if seed_connection {
            connections::ActiveModel {
                user_id: Set(user.id),
                provider: Set("practicehub".to_string()),
                remote_account_id: Set(1),
                access_token: Set("enc".to_string()),
                refresh_token: Set("enc".to_string()),
                ..Default::default()
            }
            .insert(db.as_ref())
            .await?;
        }

        let encryption =
            Arc::new(EncryptionService::new("0123456789abcdef0123456789abcdef").unwrap());
        let connections_repo =
            Arc::new(ConnectionRepository::new(db.clone(), encryption, "http://remote.test")?);
        let jobs = Arc::new(SyncJobRepository::new(db));
        let (sender, receiver) = mpsc::channel(16);
        let queue = SyncQueueService::new(sender, jobs.clone(), 5);

        let service = Arc::new(WebhookService::new(
            "practicehub".to_string(),
            SECRET.to_string(),
            "http://localhost:8080".to_string(),
            connections_repo.clone(),
            queue,
            Arc::new(FakeRemote {
                next_subscription: AtomicI64::new(1000),
            }),
            MetricsRecorder::new("redis://127.0.0.1:1/", 7)?,
        ));

        Ok(Setup {
            app: configure_routes().with_state(service),
            jobs,
            connections: connections_repo,
            receiver,
            user_id: user.id,
        })
    }

    fn sign(body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    fn delivery(user_id: i32, event_type: &str, entity_id: i64) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "event_type": event_type,
            "entity_id": entity_id,
            "user_id": user_id,
            "timestamp": "2026-03-01T10:30:00Z",
        }))
        .unwrap()
    }

    fn request(path: &str, body: Vec<u8>, signature: Option<String>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header("x-signature", signature);
        }
        builder.body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn test_valid_delivery_enqueues_exactly_one_job() -> anyhow::Result<()> {
        let mut s = setup(true).await?;
        let body = delivery(s.user_id, "matter.updated", 789012);
        let signature = sign(&body);

        let response = s
            .app
            .clone()
            .oneshot(request("/webhooks/practicehub", body, Some(signature)))
            .await?;
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let bytes = response.into_body().collect().await?.to_bytes();
        let parsed: DeliveryResponse = serde_json::from_slice(&bytes)?;
        assert_eq!(parsed.status, "accepted");
        lexsync_core::uuid::Uuid::parse_str(&parsed.delivery_id)?;
        let job_id = parsed.job_id.expect("job id");

        let row = s.jobs.find(job_id).await?;
        assert_eq!(row.mode, "single");
        assert_eq!(row.remote_id, Some(789012));
        assert!(!row.deletion);

        let message = s.receiver.recv().await.expect("enqueued message");
        assert_eq!(message.job_id(), job_id);
        assert!(s.receiver.try_recv().is_err(), "exactly one job enqueued");
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_signature_is_401_and_no_job() -> anyhow::Result<()> {
        let mut s = setup(true).await?;
        let body = delivery(s.user_id, "matter.updated", 789012);

        let response = s
            .app
            .clone()
            .oneshot(request(
                "/webhooks/practicehub",
                body,
                Some("deadbeef".repeat(8)),
            ))
            .await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(s.receiver.try_recv().is_err(), "no job enqueued");
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_signature_is_401() -> anyhow::Result<()> {
        let s = setup(true).await?;
        let body = delivery(s.user_id, "matter.updated", 789012);

        let response = s
            .app
            .clone()
            .oneshot(request("/webhooks/practicehub", body, None))
            .await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_event_type_is_acked_and_discarded() -> anyhow::Result<()> {
        let mut s = setup(true).await?;
        let body = delivery(s.user_id, "invoice.created", 5);
        let signature = sign(&body);

        let response = s
            .app
            .clone()
            .oneshot(request("/webhooks/practicehub", body, Some(signature)))
            .await?;
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let bytes = response.into_body().collect().await?.to_bytes();
        let parsed: DeliveryResponse = serde_json::from_slice(&bytes)?;
        assert_eq!(parsed.status, "discarded");
        assert!(s.receiver.try_recv().is_err(), "no job enqueued");
        Ok(())
    }

    #[tokio::test]
    async fn test_deletion_event_sets_deletion_flag() -> anyhow::Result<()> {
        let mut s = setup(true).await?;
        let body = delivery(s.user_id, "task.deleted", 9_007_199_254_740_993);
        let signature = sign(&body);

        let response = s
            .app
            .clone()
            .oneshot(request("/webhooks/practicehub", body, Some(signature)))
            .await?;
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let message = s.receiver.recv().await.expect("enqueued message");
        let row = s.jobs.find(message.job_id()).await?;
        assert!(row.deletion);
        assert_eq!(row.remote_id, Some(9_007_199_254_740_993));
        Ok(())
    }

    #[tokio::test]
    async fn test_registration_stores_subscription_ids() -> anyhow::Result<()> {
        let s = setup(true).await?;

        let response = s
            .app
            .clone()
            .oneshot(request(
                &format!("/webhooks/register/{}", s.user_id),
                Vec::new(),
                None,
            ))
            .await?;
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response.into_body().collect().await?.to_bytes();
        let parsed: RegistrationResponse = serde_json::from_slice(&bytes)?;
        assert_eq!(parsed.subscriptions.len(), 4);

        let connection = s
            .connections
            .find_active_by_user(s.user_id, "practicehub")
            .await?;
        let stored = connection.webhook_subscriptions.expect("stored");
        assert!(stored.get("matter").is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_registration_without_connection_is_404() -> anyhow::Result<()> {
        let s = setup(false).await?;

        let response = s
            .app
            .clone()
            .oneshot(request(
                &format!("/webhooks/register/{}", s.user_id),
                Vec::new(),
                None,
            ))
            .await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        Ok(())
    }
}
