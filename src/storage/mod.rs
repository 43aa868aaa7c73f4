// ABOUTME: Storage abstraction for the authorization core with pluggable backends
// ABOUTME: Clients, codes, refresh tokens, sessions, login transactions, and a lock primitive
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quarry Search

/// Backend selection from configuration
pub mod factory;
/// Single-process in-memory backend
pub mod memory;
/// Shared Redis backend
pub mod redis;

use crate::errors::AppResult;
use crate::models::{
    AuthorizationCode, ClientMetadata, LoginTransaction, RefreshTokenRecord, UserSession,
};
use std::sync::Arc;
use std::time::Duration;

/// Capability interface over the two cooperating stores
///
/// Every record carries an explicit expiry; implementations must treat
/// expired records as absent on read (lazy expiry) in addition to any
/// backend-native TTL eviction. `consume_*` operations are read-and-delete:
/// after one successful consume, every later consume of the same key
/// returns `None`.
#[async_trait::async_trait]
pub trait AuthStore: Send + Sync {
    /// Persist a newly registered client; clients are immutable afterwards
    async fn create_client(&self, client: &ClientMetadata) -> AppResult<()>;

    /// Fetch client metadata by id
    async fn get_client(&self, client_id: &str) -> AppResult<Option<ClientMetadata>>;

    /// Persist an authorization code until its expiry
    async fn put_auth_code(&self, code: &AuthorizationCode) -> AppResult<()>;

    /// Consume an authorization code: single use, read-and-delete
    async fn consume_auth_code(&self, code: &str) -> AppResult<Option<AuthorizationCode>>;

    /// Persist a refresh token record under its token hash
    async fn put_refresh_token(&self, record: &RefreshTokenRecord) -> AppResult<()>;

    /// Fetch a refresh token record by token hash
    async fn get_refresh_token(&self, token_hash: &str) -> AppResult<Option<RefreshTokenRecord>>;

    /// Delete a refresh token record; used to invalidate the predecessor on rotation
    async fn delete_refresh_token(&self, token_hash: &str) -> AppResult<()>;

    /// Persist a browser session until its expiry
    async fn put_session(&self, session: &UserSession) -> AppResult<()>;

    /// Fetch a session by id
    async fn get_session(&self, session_id: &str) -> AppResult<Option<UserSession>>;

    /// Delete a session, forcing the next authorization visit through login
    async fn delete_session(&self, session_id: &str) -> AppResult<()>;

    /// Persist an in-flight upstream login transaction
    async fn put_login_transaction(&self, tx: &LoginTransaction) -> AppResult<()>;

    /// Consume a login transaction: single use, read-and-delete
    async fn consume_login_transaction(&self, tx_id: &str) -> AppResult<Option<LoginTransaction>>;

    /// Try to acquire a mutual-exclusion lock, returning a release token
    ///
    /// Two concurrent acquisitions of the same key must never both succeed
    /// before one releases or the TTL expires. `None` means the lock is held.
    async fn acquire_lock(&self, key: &str, ttl: Duration) -> AppResult<Option<String>>;

    /// Release a lock, but only if `token` still identifies the holder
    ///
    /// A holder whose TTL already expired and whose lock was reacquired by
    /// someone else must not release the new holder's lock.
    async fn release_lock(&self, key: &str, token: &str) -> AppResult<()>;
}

/// Drop-safe wrapper around an acquired lock
///
/// Rotation code releases explicitly on every path; the drop hook is the
/// backstop so a panic mid-rotation does not pin the lock until its TTL.
pub struct LockGuard {
    store: Arc<dyn AuthStore>,
    key: String,
    token: Option<String>,
}

impl LockGuard {
    /// Try to acquire `key`; returns `None` when a concurrent holder owns it
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails
    pub async fn acquire(
        store: Arc<dyn AuthStore>,
        key: &str,
        ttl: Duration,
    ) -> AppResult<Option<Self>> {
        let token = store.acquire_lock(key, ttl).await?;
        Ok(token.map(|token| Self {
            store,
            key: key.to_owned(),
            token: Some(token),
        }))
    }

    /// Release the lock now
    pub async fn release(mut self) {
        if let Some(token) = self.token.take() {
            if let Err(e) = self.store.release_lock(&self.key, &token).await {
                tracing::warn!(key = %self.key, "failed to release lock: {e}");
            }
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            let store = Arc::clone(&self.store);
            let key = std::mem::take(&mut self.key);
            // Best effort: if no runtime is available the TTL still bounds the hold
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    if let Err(e) = store.release_lock(&key, &token).await {
                        tracing::warn!(key = %key, "failed to release lock on drop: {e}");
                    }
                });
            }
        }
    }
}
