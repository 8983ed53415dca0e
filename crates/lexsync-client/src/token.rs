//! Access token lookup and refresh

use async_trait::async_trait;
use lexsync_core::SyncResult;

/// Source of access tokens for outbound API calls.
///
/// Implemented by the connection repository; `refresh` exchanges the stored
/// refresh token for a new access token and persists both before returning.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Current decrypted access token for a connection.
    async fn access_token(&self, connection_id: i32) -> SyncResult<String>;

    /// Refresh the connection's credentials and return the new access token.
    ///
    /// Returns `SyncError::ReauthorizationRequired` when the refresh token
    /// itself has been revoked; the implementation marks the connection
    /// degraded before surfacing that error.
    async fn refresh(&self, connection_id: i32) -> SyncResult<String>;
}
