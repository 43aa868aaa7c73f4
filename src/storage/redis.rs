// ABOUTME: Redis storage backend for multi-instance deployments
// ABOUTME: TTLs mirror record expiry so the backend self-evicts; locks use SET NX with scripted release
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quarry Search

use super::AuthStore;
use crate::crypto::generate_urlsafe_token;
use crate::errors::{AppError, AppResult};
use crate::models::{
    AuthorizationCode, ClientMetadata, LoginTransaction, RefreshTokenRecord, UserSession,
};
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::info;

const KEY_PREFIX: &str = "quarry:auth:";

/// Release only when the stored token still identifies the caller, as one
/// atomic script. A holder whose TTL expired and whose key was reacquired
/// compares unequal and deletes nothing.
const RELEASE_LOCK_SCRIPT: &str = r"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('del', KEYS[1])
else
    return 0
end";

/// Shared Redis backend
///
/// Uses `ConnectionManager` for automatic reconnection. Every write carries
/// an expiry matching the record's `expires_at`, so Redis evicts records on
/// its own; reads still apply the lazy expiry check because Redis TTLs have
/// second granularity.
#[derive(Clone)]
pub struct RedisAuthStore {
    manager: ConnectionManager,
}

impl RedisAuthStore {
    /// Connect to Redis
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established
    pub async fn connect(redis_url: &str) -> AppResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| AppError::storage(format!("failed to create Redis client: {e}")))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| AppError::storage(format!("failed to connect to Redis: {e}")))?;

        info!("Connected to Redis auth store");
        Ok(Self { manager })
    }

    fn key(kind: &str, id: &str) -> String {
        format!("{KEY_PREFIX}{kind}:{id}")
    }

    fn ttl_secs(expires_at: DateTime<Utc>) -> u64 {
        u64::try_from((expires_at - Utc::now()).num_seconds()).unwrap_or(0).max(1)
    }

    async fn put<T: Serialize + Sync>(
        &self,
        kind: &str,
        id: &str,
        value: &T,
        expires_at: Option<DateTime<Utc>>,
    ) -> AppResult<()> {
        let mut conn = self.manager.clone();
        let serialized = serde_json::to_string(value)?;
        let key = Self::key(kind, id);
        match expires_at {
            Some(expires_at) => {
                conn.set_ex::<_, _, ()>(&key, serialized, Self::ttl_secs(expires_at))
                    .await?;
            }
            None => {
                conn.set::<_, _, ()>(&key, serialized).await?;
            }
        }
        Ok(())
    }

    async fn get<T: DeserializeOwned>(&self, kind: &str, id: &str) -> AppResult<Option<T>> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn.get(Self::key(kind, id)).await?;
        raw.map(|s| serde_json::from_str(&s).map_err(AppError::from))
            .transpose()
    }

    /// Atomic read-and-delete; the basis of every `consume_*` operation
    async fn take<T: DeserializeOwned>(&self, kind: &str, id: &str) -> AppResult<Option<T>> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn.get_del(Self::key(kind, id)).await?;
        raw.map(|s| serde_json::from_str(&s).map_err(AppError::from))
            .transpose()
    }

    async fn delete(&self, kind: &str, id: &str) -> AppResult<()> {
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(Self::key(kind, id)).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl AuthStore for RedisAuthStore {
    async fn create_client(&self, client: &ClientMetadata) -> AppResult<()> {
        // Clients are never expired or deleted by this system
        self.put("client", &client.client_id, client, None).await
    }

    async fn get_client(&self, client_id: &str) -> AppResult<Option<ClientMetadata>> {
        self.get("client", client_id).await
    }

    async fn put_auth_code(&self, code: &AuthorizationCode) -> AppResult<()> {
        self.put("code", &code.code, code, Some(code.expires_at))
            .await
    }

    async fn consume_auth_code(&self, code: &str) -> AppResult<Option<AuthorizationCode>> {
        let record: Option<AuthorizationCode> = self.take("code", code).await?;
        Ok(record.filter(|r| r.expires_at > Utc::now()))
    }

    async fn put_refresh_token(&self, record: &RefreshTokenRecord) -> AppResult<()> {
        self.put(
            "refresh",
            &record.token_hash,
            record,
            Some(record.expires_at),
        )
        .await
    }

    async fn get_refresh_token(&self, token_hash: &str) -> AppResult<Option<RefreshTokenRecord>> {
        let record: Option<RefreshTokenRecord> = self.get("refresh", token_hash).await?;
        Ok(record.filter(|r| r.expires_at > Utc::now()))
    }

    async fn delete_refresh_token(&self, token_hash: &str) -> AppResult<()> {
        self.delete("refresh", token_hash).await
    }

    async fn put_session(&self, session: &UserSession) -> AppResult<()> {
        self.put(
            "session",
            &session.session_id,
            session,
            Some(session.expires_at),
        )
        .await
    }

    async fn get_session(&self, session_id: &str) -> AppResult<Option<UserSession>> {
        let session: Option<UserSession> = self.get("session", session_id).await?;
        Ok(session.filter(|s| s.expires_at > Utc::now()))
    }

    async fn delete_session(&self, session_id: &str) -> AppResult<()> {
        self.delete("session", session_id).await
    }

    async fn put_login_transaction(&self, tx: &LoginTransaction) -> AppResult<()> {
        self.put("tx", &tx.tx_id, tx, Some(tx.expires_at)).await
    }

    async fn consume_login_transaction(&self, tx_id: &str) -> AppResult<Option<LoginTransaction>> {
        let tx: Option<LoginTransaction> = self.take("tx", tx_id).await?;
        Ok(tx.filter(|t| t.expires_at > Utc::now()))
    }

    async fn acquire_lock(&self, key: &str, ttl: Duration) -> AppResult<Option<String>> {
        let token = generate_urlsafe_token(16)?;
        let mut conn = self.manager.clone();
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(30_000).max(1);

        // SET NX PX: atomic acquire-with-expiry
        let acquired: Option<String> = redis::cmd("SET")
            .arg(Self::key("lock", key))
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;

        Ok(acquired.map(|_| token))
    }

    async fn release_lock(&self, key: &str, token: &str) -> AppResult<()> {
        let mut conn = self.manager.clone();
        let _released: i64 = redis::Script::new(RELEASE_LOCK_SCRIPT)
            .key(Self::key("lock", key))
            .arg(token)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }
}
