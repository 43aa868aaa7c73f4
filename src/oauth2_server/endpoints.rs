// ABOUTME: OAuth 2.0 token endpoint implementation
// ABOUTME: Code exchange with PKCE verification and lock-guarded refresh token rotation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quarry Search

use super::models::{OAuth2Error, TokenRequest, TokenResponse};
use crate::context::ServerContext;
use crate::crypto::{generate_urlsafe_token, hash_refresh_token, pkce};
use crate::models::{RefreshTokenRecord, UserClaims};
use crate::storage::LockGuard;
use chrono::{Duration, Utc};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::{info, warn};

/// How long one rotation may hold the per-token lock
const ROTATION_LOCK_TTL: StdDuration = StdDuration::from_secs(30);

/// The token endpoint: two grants behind one entry point
///
/// Both grants require a registered public client. Authorization codes are
/// consumed exactly once; refresh tokens rotate under a per-token-hash lock
/// so a concurrent double redemption can never double-issue.
pub struct TokenEndpoint {
    ctx: Arc<ServerContext>,
}

impl TokenEndpoint {
    /// Create the endpoint over the shared server context
    #[must_use]
    pub fn new(ctx: Arc<ServerContext>) -> Self {
        Self { ctx }
    }

    /// Handle POST /oauth/token
    ///
    /// # Errors
    ///
    /// Returns a structured OAuth error; the route layer maps `slow_down`
    /// to 429 and everything else to 400
    pub async fn token(&self, request: TokenRequest) -> Result<TokenResponse, OAuth2Error> {
        let client = self
            .ctx
            .store
            .get_client(&request.client_id)
            .await
            .map_err(|e| {
                warn!(client_id = %request.client_id, "client lookup failed: {e}");
                OAuth2Error::invalid_client()
            })?
            .ok_or_else(OAuth2Error::invalid_client)?;

        if !matches!(
            request.grant_type.as_str(),
            "authorization_code" | "refresh_token"
        ) {
            return Err(OAuth2Error::unsupported_grant_type());
        }
        if !client.grant_types.iter().any(|g| g == &request.grant_type) {
            return Err(OAuth2Error::unauthorized_client(
                "The client is not registered for this grant_type",
            ));
        }

        match request.grant_type.as_str() {
            "authorization_code" => self.handle_authorization_code_grant(request).await,
            _ => self.handle_refresh_token_grant(request).await,
        }
    }

    /// Handle the authorization code grant
    async fn handle_authorization_code_grant(
        &self,
        request: TokenRequest,
    ) -> Result<TokenResponse, OAuth2Error> {
        let code = request
            .code
            .ok_or_else(|| OAuth2Error::invalid_request("Missing authorization code"))?;
        let redirect_uri = request
            .redirect_uri
            .ok_or_else(|| OAuth2Error::invalid_request("Missing redirect_uri"))?;
        let code_verifier = request
            .code_verifier
            .ok_or_else(|| OAuth2Error::invalid_request("Missing code_verifier (PKCE)"))?;

        // Consume first: even a failed exchange burns the code, so a stolen
        // code cannot be retried against its PKCE challenge.
        let auth_code = self
            .ctx
            .store
            .consume_auth_code(&code)
            .await
            .map_err(|e| {
                warn!("authorization code lookup failed: {e}");
                OAuth2Error::invalid_grant("Failed to consume authorization code")
            })?
            .ok_or_else(|| {
                warn!(client_id = %request.client_id, "authorization code missing, expired, or already used");
                OAuth2Error::invalid_grant("Invalid or expired authorization code")
            })?;

        if auth_code.client_id != request.client_id {
            warn!(client_id = %request.client_id, "authorization code bound to a different client");
            return Err(OAuth2Error::invalid_grant(
                "Authorization code was issued to a different client",
            ));
        }
        if auth_code.redirect_uri != redirect_uri {
            return Err(OAuth2Error::invalid_grant(
                "redirect_uri does not match the authorization request",
            ));
        }

        pkce::validate_verifier_format(&code_verifier).map_err(OAuth2Error::invalid_grant)?;
        if !pkce::verify_s256(&code_verifier, &auth_code.code_challenge) {
            warn!(client_id = %request.client_id, "PKCE verification failed");
            return Err(OAuth2Error::invalid_grant("Invalid code_verifier"));
        }

        let resource = auth_code.resource.or(request.resource);
        self.mint_token_pair(
            &auth_code.user_claims,
            &request.client_id,
            auth_code.scope.as_deref(),
            resource.as_deref(),
        )
        .await
    }

    /// Handle the refresh token grant with rotation
    async fn handle_refresh_token_grant(
        &self,
        request: TokenRequest,
    ) -> Result<TokenResponse, OAuth2Error> {
        let refresh_token = request
            .refresh_token
            .ok_or_else(|| OAuth2Error::invalid_request("Missing refresh_token"))?;

        let token_hash = hash_refresh_token(&self.ctx.config.token_secret, &refresh_token);
        let lock_key = format!("refresh:{token_hash}");

        // Serialize rotation per token hash: without this, two concurrent
        // redemptions could each observe the old record and double-issue.
        let guard = LockGuard::acquire(
            Arc::clone(&self.ctx.store),
            &lock_key,
            ROTATION_LOCK_TTL,
        )
        .await
        .map_err(|e| {
            warn!("rotation lock acquisition failed: {e}");
            OAuth2Error::invalid_request("Failed to process refresh token")
        })?;

        let Some(guard) = guard else {
            return Err(OAuth2Error::slow_down());
        };

        let result = self.rotate_refresh_token(&request.client_id, &token_hash).await;
        guard.release().await;
        result
    }

    /// The rotation itself; always runs under the per-token lock
    async fn rotate_refresh_token(
        &self,
        client_id: &str,
        token_hash: &str,
    ) -> Result<TokenResponse, OAuth2Error> {
        let record = self
            .ctx
            .store
            .get_refresh_token(token_hash)
            .await
            .map_err(|e| {
                warn!("refresh token lookup failed: {e}");
                OAuth2Error::invalid_grant("Failed to look up refresh token")
            })?
            .ok_or_else(|| {
                warn!(client_id = %client_id, "refresh token missing, expired, or already rotated");
                OAuth2Error::invalid_grant("Invalid or expired refresh token")
            })?;

        if record.client_id != client_id {
            warn!(client_id = %client_id, "refresh token bound to a different client");
            return Err(OAuth2Error::invalid_grant(
                "Refresh token was issued to a different client",
            ));
        }

        let response = self
            .mint_token_pair(
                &record.user_claims,
                client_id,
                record.scope.as_deref(),
                record.resource.as_deref(),
            )
            .await?;

        // The old token is unusable the instant the new record is persisted;
        // deleting it afterwards keeps exactly one valid link in the chain.
        self.ctx
            .store
            .delete_refresh_token(token_hash)
            .await
            .map_err(|e| {
                warn!("failed to delete rotated refresh token: {e}");
                OAuth2Error::invalid_request("Failed to rotate refresh token")
            })?;

        info!(client_id = %client_id, sub = %record.user_claims.sub, "refresh token rotated");
        Ok(response)
    }

    /// Mint an access token plus a fresh refresh token persisted by hash
    async fn mint_token_pair(
        &self,
        user_claims: &UserClaims,
        client_id: &str,
        scope: Option<&str>,
        resource: Option<&str>,
    ) -> Result<TokenResponse, OAuth2Error> {
        let access_token = self
            .ctx
            .token_manager
            .mint_access_token(user_claims, client_id, scope, resource)
            .map_err(|e| {
                warn!(client_id = %client_id, "failed to mint access token: {e}");
                OAuth2Error::invalid_request("Failed to generate access token")
            })?;

        let refresh_token_value = generate_urlsafe_token(32).map_err(|e| {
            warn!("failed to generate refresh token: {e}");
            OAuth2Error::invalid_request("Failed to generate refresh token")
        })?;

        let now = Utc::now();
        let record = RefreshTokenRecord {
            token_hash: hash_refresh_token(&self.ctx.config.token_secret, &refresh_token_value),
            client_id: client_id.to_owned(),
            scope: scope.map(str::to_owned),
            resource: resource.map(str::to_owned),
            user_claims: user_claims.clone(),
            created_at: now,
            expires_at: now + Duration::days(self.ctx.config.refresh_token_ttl_days),
        };

        self.ctx
            .store
            .put_refresh_token(&record)
            .await
            .map_err(|e| {
                warn!(client_id = %client_id, "failed to store refresh token: {e}");
                OAuth2Error::invalid_request("Failed to store refresh token")
            })?;

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_owned(),
            expires_in: self.ctx.token_manager.access_token_ttl_secs(),
            refresh_token: Some(refresh_token_value),
            scope: scope.map(str::to_owned),
        })
    }
}
