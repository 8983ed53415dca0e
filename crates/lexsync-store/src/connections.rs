//! Connection persistence and credential management

use async_trait::async_trait;
use chrono::{Duration, Utc};
use lexsync_client::TokenStore;
use lexsync_core::{ConnectionStatus, EncryptionService, SyncError, SyncResult, UtcDateTime};
use lexsync_entities::connections;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

/// Repository for connections: lookup, status transitions, the incremental
/// watermark, webhook subscription ids, and credential storage.
///
/// Tokens are encrypted at rest; this repository is the only place they are
/// decrypted. It also implements the client's `TokenStore`, performing the
/// refresh-token exchange against the remote and persisting the rotated
/// credentials before returning.
pub struct ConnectionRepository {
    db: Arc<DatabaseConnection>,
    encryption: Arc<EncryptionService>,
    http: reqwest::Client,
    token_url: String,
}

impl ConnectionRepository {
    pub fn new(
        db: Arc<DatabaseConnection>,
        encryption: Arc<EncryptionService>,
        remote_base_url: &str,
    ) -> SyncResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent("Lexsync-Engine/1.0")
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| SyncError::Internal(e.into()))?;

        Ok(Self {
            db,
            encryption,
            http,
            token_url: format!("{}/oauth/token", remote_base_url.trim_end_matches('/')),
        })
    }

    pub async fn find_by_id(&self, connection_id: i32) -> SyncResult<connections::Model> {
        connections::Entity::find_by_id(connection_id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?
            .ok_or_else(|| SyncError::ConnectionNotFound {
                detail: format!("connection {} not found", connection_id),
            })
    }

    /// The connection, only if its credentials are usable for sync work.
    ///
    /// Degraded and disconnected connections get no remote traffic until the
    /// user re-authorizes; callers about to touch the remote go through this
    /// instead of [`find_by_id`](Self::find_by_id).
    pub async fn find_syncable(&self, connection_id: i32) -> SyncResult<connections::Model> {
        let connection = self.find_by_id(connection_id).await?;
        match ConnectionStatus::parse(&connection.status) {
            Some(ConnectionStatus::Active) => Ok(connection),
            _ => Err(SyncError::ReauthorizationRequired { connection_id }),
        }
    }

    /// The user's active connection for a provider.
    pub async fn find_active_by_user(
        &self,
        user_id: i32,
        provider: &str,
    ) -> SyncResult<connections::Model> {
        connections::Entity::find()
            .filter(connections::Column::UserId.eq(user_id))
            .filter(connections::Column::Provider.eq(provider))
            .filter(connections::Column::Status.eq(ConnectionStatus::Active.as_str()))
            .one(self.db.as_ref())
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?
            .ok_or_else(|| SyncError::ConnectionNotFound {
                detail: format!("no active {} connection for user {}", provider, user_id),
            })
    }

    pub async fn mark_status(
        &self,
        connection_id: i32,
        status: ConnectionStatus,
    ) -> SyncResult<()> {
        let connection = self.find_by_id(connection_id).await?;
        let mut model: connections::ActiveModel = connection.into();
        model.status = Set(status.as_str().to_string());
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;
        info!(connection_id, status = status.as_str(), "connection status changed");
        Ok(())
    }

    /// Advance the incremental watermark to `synced_at`.
    ///
    /// Called only after a batch job completes every page; partial failures
    /// leave the watermark untouched so the next incremental run re-fetches.
    pub async fn advance_watermark(
        &self,
        connection_id: i32,
        synced_at: UtcDateTime,
    ) -> SyncResult<()> {
        let connection = self.find_by_id(connection_id).await?;
        let mut model: connections::ActiveModel = connection.into();
        model.last_synced_at = Set(Some(synced_at));
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;
        Ok(())
    }

    /// Store remote webhook subscription ids, keyed by entity type.
    pub async fn store_webhook_subscriptions(
        &self,
        connection_id: i32,
        subscriptions: &HashMap<String, i64>,
    ) -> SyncResult<()> {
        let connection = self.find_by_id(connection_id).await?;
        let mut model: connections::ActiveModel = connection.into();
        model.webhook_subscriptions = Set(Some(serde_json::to_value(subscriptions)?));
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;
        Ok(())
    }

    /// Persist new credentials (encrypting them) after a token exchange.
    pub async fn store_credentials(
        &self,
        connection_id: i32,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<UtcDateTime>,
    ) -> SyncResult<()> {
        let connection = self.find_by_id(connection_id).await?;
        let mut model: connections::ActiveModel = connection.into();
        model.access_token = Set(self.encryption.encrypt_string(access_token)?);
        if let Some(refresh_token) = refresh_token {
            model.refresh_token = Set(self.encryption.encrypt_string(refresh_token)?);
        }
        model.token_expires_at = Set(expires_at);
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl TokenStore for ConnectionRepository {
    async fn access_token(&self, connection_id: i32) -> SyncResult<String> {
        let connection = self.find_by_id(connection_id).await?;
        Ok(self.encryption.decrypt_string(&connection.access_token)?)
    }

    async fn refresh(&self, connection_id: i32) -> SyncResult<String> {
        let connection = self.find_by_id(connection_id).await?;
        let refresh_token = self.encryption.decrypt_string(&connection.refresh_token)?;

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
        ];
        let response = self
            .http
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| SyncError::TransientRemote {
                detail: format!("token refresh request failed: {}", e),
            })?;

        if !response.status().is_success() {
            // Revoked or expired refresh token; the connection needs the
            // user to re-authorize before any further sync work.
            warn!(
                connection_id,
                status = %response.status(),
                "token refresh rejected, marking connection degraded"
            );
            self.mark_status(connection_id, ConnectionStatus::Degraded)
                .await?;
            return Err(SyncError::ReauthorizationRequired { connection_id });
        }

        let token: TokenResponse =
            response
                .json()
                .await
                .map_err(|e| SyncError::TransientRemote {
                    detail: format!("failed to parse token response: {}", e),
                })?;

        let expires_at = token
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs));
        self.store_credentials(
            connection_id,
            &token.access_token,
            token.refresh_token.as_deref(),
            expires_at,
        )
        .await?;

        info!(connection_id, "access token refreshed");
        Ok(token.access_token)
    }
}
