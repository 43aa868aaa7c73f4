// ABOUTME: Single-process in-memory storage backend for development and tests
// ABOUTME: DashMap-backed maps with lazy expiry checks on every read
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quarry Search

use super::AuthStore;
use crate::crypto::generate_urlsafe_token;
use crate::errors::AppResult;
use crate::models::{
    AuthorizationCode, ClientMetadata, LoginTransaction, RefreshTokenRecord, UserSession,
};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;

struct LockEntry {
    token: String,
    expires_at: DateTime<Utc>,
}

/// In-memory backend; state does not survive restart
///
/// Lock acquisition is check-then-set under the map's per-key entry guard,
/// which is single-process safe only. Multi-instance deployments use the
/// Redis backend.
#[derive(Default)]
pub struct MemoryAuthStore {
    clients: DashMap<String, ClientMetadata>,
    auth_codes: DashMap<String, AuthorizationCode>,
    refresh_tokens: DashMap<String, RefreshTokenRecord>,
    sessions: DashMap<String, UserSession>,
    transactions: DashMap<String, LoginTransaction>,
    locks: DashMap<String, LockEntry>,
}

impl MemoryAuthStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl AuthStore for MemoryAuthStore {
    async fn create_client(&self, client: &ClientMetadata) -> AppResult<()> {
        self.clients
            .insert(client.client_id.clone(), client.clone());
        Ok(())
    }

    async fn get_client(&self, client_id: &str) -> AppResult<Option<ClientMetadata>> {
        Ok(self.clients.get(client_id).map(|c| c.clone()))
    }

    async fn put_auth_code(&self, code: &AuthorizationCode) -> AppResult<()> {
        self.auth_codes.insert(code.code.clone(), code.clone());
        Ok(())
    }

    async fn consume_auth_code(&self, code: &str) -> AppResult<Option<AuthorizationCode>> {
        Ok(self
            .auth_codes
            .remove(code)
            .map(|(_, record)| record)
            .filter(|record| record.expires_at > Utc::now()))
    }

    async fn put_refresh_token(&self, record: &RefreshTokenRecord) -> AppResult<()> {
        self.refresh_tokens
            .insert(record.token_hash.clone(), record.clone());
        Ok(())
    }

    async fn get_refresh_token(&self, token_hash: &str) -> AppResult<Option<RefreshTokenRecord>> {
        Ok(self
            .refresh_tokens
            .get(token_hash)
            .map(|record| record.clone())
            .filter(|record| record.expires_at > Utc::now()))
    }

    async fn delete_refresh_token(&self, token_hash: &str) -> AppResult<()> {
        self.refresh_tokens.remove(token_hash);
        Ok(())
    }

    async fn put_session(&self, session: &UserSession) -> AppResult<()> {
        self.sessions
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> AppResult<Option<UserSession>> {
        Ok(self
            .sessions
            .get(session_id)
            .map(|session| session.clone())
            .filter(|session| session.expires_at > Utc::now()))
    }

    async fn delete_session(&self, session_id: &str) -> AppResult<()> {
        self.sessions.remove(session_id);
        Ok(())
    }

    async fn put_login_transaction(&self, tx: &LoginTransaction) -> AppResult<()> {
        self.transactions.insert(tx.tx_id.clone(), tx.clone());
        Ok(())
    }

    async fn consume_login_transaction(&self, tx_id: &str) -> AppResult<Option<LoginTransaction>> {
        Ok(self
            .transactions
            .remove(tx_id)
            .map(|(_, tx)| tx)
            .filter(|tx| tx.expires_at > Utc::now()))
    }

    async fn acquire_lock(&self, key: &str, ttl: Duration) -> AppResult<Option<String>> {
        let token = generate_urlsafe_token(16)?;
        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(30));

        // The entry guard holds the shard lock, making check-then-set atomic
        // within this process.
        match self.locks.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().expires_at > Utc::now() {
                    return Ok(None);
                }
                occupied.insert(LockEntry {
                    token: token.clone(),
                    expires_at,
                });
                Ok(Some(token))
            }
            Entry::Vacant(vacant) => {
                vacant.insert(LockEntry {
                    token: token.clone(),
                    expires_at,
                });
                Ok(Some(token))
            }
        }
    }

    async fn release_lock(&self, key: &str, token: &str) -> AppResult<()> {
        self.locks.remove_if(key, |_, entry| entry.token == token);
        Ok(())
    }
}
