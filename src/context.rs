// ABOUTME: Shared server context for dependency injection into request handlers
// ABOUTME: Also defines the per-request authenticated-user extension published by the middleware
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quarry Search

use crate::auth::{AccessTokenClaims, TokenManager};
use crate::config::ServerConfig;
use crate::crypto::{StateSigner, TokenCipher};
use crate::errors::AppResult;
use crate::storage::AuthStore;
use crate::upstream::UpstreamClient;
use std::sync::Arc;

/// All shared dependencies, built once at startup and handed to every
/// handler through axum state
///
/// No handler holds protocol state of its own; everything durable goes
/// through `store`, and the only cross-request in-process state is the
/// upstream discovery cache inside `upstream`.
pub struct ServerContext {
    /// Deployment configuration
    pub config: Arc<ServerConfig>,
    /// Durable protocol state
    pub store: Arc<dyn AuthStore>,
    /// Access token minting and validation
    pub token_manager: Arc<TokenManager>,
    /// Cookie and redirect-state signing
    pub state_signer: Arc<StateSigner>,
    /// At-rest sealing for upstream credentials
    pub token_cipher: Arc<TokenCipher>,
    /// Upstream identity provider client
    pub upstream: Arc<UpstreamClient>,
}

impl ServerContext {
    /// Assemble a context from configuration and a prepared store
    ///
    /// # Errors
    ///
    /// Returns an error if the upstream HTTP client cannot be constructed
    pub fn new(config: ServerConfig, store: Arc<dyn AuthStore>) -> AppResult<Self> {
        let token_manager = TokenManager::new(
            config.token_secret.as_bytes(),
            config.public_url.clone(),
            config.access_token_ttl_secs,
        );
        let state_signer = StateSigner::new(config.cookie_secret.as_bytes());
        let token_cipher = TokenCipher::from_secret(&config.token_secret);
        let upstream = UpstreamClient::new(config.upstream.clone())?;

        Ok(Self {
            config: Arc::new(config),
            store,
            token_manager: Arc::new(token_manager),
            state_signer: Arc::new(state_signer),
            token_cipher: Arc::new(token_cipher),
            upstream: Arc::new(upstream),
        })
    }

    /// Assemble a context with an explicit upstream client; used by tests
    /// and deployments that pin the provider configuration
    #[must_use]
    pub fn with_upstream(
        config: ServerConfig,
        store: Arc<dyn AuthStore>,
        upstream: UpstreamClient,
    ) -> Self {
        let token_manager = TokenManager::new(
            config.token_secret.as_bytes(),
            config.public_url.clone(),
            config.access_token_ttl_secs,
        );
        let state_signer = StateSigner::new(config.cookie_secret.as_bytes());
        let token_cipher = TokenCipher::from_secret(&config.token_secret);

        Self {
            config: Arc::new(config),
            store,
            token_manager: Arc::new(token_manager),
            state_signer: Arc::new(state_signer),
            token_cipher: Arc::new(token_cipher),
            upstream: Arc::new(upstream),
        }
    }
}

/// Verified bearer identity, published into request extensions by the auth
/// middleware so downstream handlers never re-validate the token
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// Validated access token claims
    pub claims: AccessTokenClaims,
}

impl AuthenticatedUser {
    /// Subject of the validated token
    #[must_use]
    pub fn sub(&self) -> &str {
        &self.claims.sub
    }

    /// Granted scopes, split from the space-separated claim
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        self.claims
            .scope
            .as_deref()
            .map(|s| s.split(' ').filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }
}
