// ABOUTME: Drives the authorization-code grant against the upstream identity provider
// ABOUTME: Builds PKCE login URLs, redeems upstream codes, and merges userinfo claims
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quarry Search

use super::provider::ProviderDirectory;
use crate::config::UpstreamConfig;
use crate::crypto::pkce;
use crate::errors::{AppError, AppResult};
use crate::models::UserClaims;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::Rng;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Bounded timeout for every upstream network call, so a slow provider
/// cannot exhaust request-handling capacity.
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

const CODE_VERIFIER_LENGTH: usize = 64;

/// PKCE verifier/challenge pair for one upstream login
#[derive(Debug, Clone)]
pub struct PkceParams {
    /// Secret verifier, persisted in the login transaction
    pub code_verifier: String,
    /// S256 challenge sent in the authorization URL
    pub code_challenge: String,
}

impl PkceParams {
    /// Generate a fresh verifier/challenge pair with the `S256` method
    #[must_use]
    pub fn generate() -> Self {
        const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";
        let mut rng = rand::thread_rng();
        let code_verifier: String = (0..CODE_VERIFIER_LENGTH)
            .map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char)
            .collect();

        let code_challenge = pkce::challenge_s256(&code_verifier);

        Self {
            code_verifier,
            code_challenge,
        }
    }
}

/// Token set returned by the upstream code exchange
#[derive(Debug)]
pub struct UpstreamTokens {
    /// Upstream access token; used for the userinfo fetch
    pub access_token: String,
    /// Upstream refresh token, when the provider issues one
    pub refresh_token: Option<String>,
    /// Claims decoded from the ID token
    pub id_claims: serde_json::Map<String, Value>,
}

#[derive(Deserialize)]
struct TokenExchangeResponse {
    access_token: String,
    refresh_token: Option<String>,
    id_token: Option<String>,
}

/// Client for the configured upstream identity provider
pub struct UpstreamClient {
    config: UpstreamConfig,
    directory: ProviderDirectory,
    http: reqwest::Client,
}

impl UpstreamClient {
    /// Create a client, wiring the shared HTTP client into discovery
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed
    pub fn new(config: UpstreamConfig) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(UPSTREAM_TIMEOUT)
            .connect_timeout(UPSTREAM_TIMEOUT)
            .build()
            .map_err(|e| AppError::internal(format!("failed to build HTTP client: {e}")))?;

        let directory = ProviderDirectory::new(config.issuer.clone(), http.clone());
        Ok(Self {
            config,
            directory,
            http,
        })
    }

    /// Create a client around an existing directory; used by tests and
    /// deployments that pin the provider configuration
    #[must_use]
    pub fn with_directory(config: UpstreamConfig, directory: ProviderDirectory) -> Self {
        let http = reqwest::Client::builder()
            .timeout(UPSTREAM_TIMEOUT)
            .connect_timeout(UPSTREAM_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            config,
            directory,
            http,
        }
    }

    /// Build the browser-facing authorization URL for one login transaction
    ///
    /// # Errors
    ///
    /// Returns an error if discovery fails or the endpoint is not a URL
    pub async fn authorization_url(
        &self,
        redirect_uri: &str,
        state: &str,
        pkce: &PkceParams,
        nonce: &str,
    ) -> AppResult<String> {
        let doc = self.directory.discover().await?;
        let mut url = Url::parse(&doc.authorization_endpoint)
            .map_err(|e| AppError::external_service("upstream discovery", e.to_string()))?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("state", state)
            .append_pair("nonce", nonce)
            .append_pair("code_challenge", &pkce.code_challenge)
            .append_pair("code_challenge_method", "S256");

        Ok(url.to_string())
    }

    /// Redeem an upstream authorization code
    ///
    /// The ID token's claims are decoded without local signature verification:
    /// they arrive over the direct TLS exchange with the provider's token
    /// endpoint. The nonce bound into the login transaction is still checked.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange fails, the response is malformed, or
    /// the ID-token nonce does not match
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
        expected_nonce: &str,
    ) -> AppResult<UpstreamTokens> {
        let doc = self.directory.discover().await?;

        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
            ("code_verifier", code_verifier),
        ];

        let response: TokenExchangeResponse = self
            .http
            .post(&doc.token_endpoint)
            .form(&params)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| AppError::external_service("upstream token endpoint", e.to_string()))?
            .json()
            .await?;

        let id_claims = response
            .id_token
            .as_deref()
            .map(decode_jwt_claims)
            .transpose()?
            .unwrap_or_default();

        if let Some(Value::String(nonce)) = id_claims.get("nonce") {
            if nonce != expected_nonce {
                return Err(AppError::auth_invalid("upstream ID token nonce mismatch"));
            }
        } else {
            return Err(AppError::auth_invalid("upstream ID token missing nonce"));
        }

        Ok(UpstreamTokens {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            id_claims,
        })
    }

    /// Fetch userinfo claims with the upstream access token
    ///
    /// Returns an empty map when the provider has no userinfo endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the fetch fails or the body is not a JSON object
    pub async fn fetch_userinfo(
        &self,
        access_token: &str,
    ) -> AppResult<serde_json::Map<String, Value>> {
        let doc = self.directory.discover().await?;
        let Some(userinfo_endpoint) = doc.userinfo_endpoint.as_deref() else {
            return Ok(serde_json::Map::new());
        };

        let body: Value = self
            .http
            .get(userinfo_endpoint)
            .bearer_auth(access_token)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| AppError::external_service("upstream userinfo", e.to_string()))?
            .json()
            .await?;

        match body {
            Value::Object(map) => Ok(map),
            _ => Err(AppError::external_service(
                "upstream userinfo",
                "response is not a JSON object",
            )),
        }
    }

    /// Resolve the final identity for a completed upstream login
    ///
    /// ID-token claims form the base; userinfo fills in everything else.
    /// A userinfo `sub` that contradicts the ID token is rejected outright.
    ///
    /// # Errors
    ///
    /// Returns an error on a userinfo fetch failure or a subject mismatch
    pub async fn resolve_claims(&self, tokens: &UpstreamTokens) -> AppResult<UserClaims> {
        let userinfo = self.fetch_userinfo(&tokens.access_token).await?;

        let id_sub = tokens.id_claims.get("sub").and_then(Value::as_str);
        if let (Some(id_sub), Some(Value::String(info_sub))) = (id_sub, userinfo.get("sub")) {
            if id_sub != info_sub {
                return Err(AppError::auth_invalid(
                    "upstream userinfo subject does not match ID token",
                ));
            }
        }

        let mut merged = tokens.id_claims.clone();
        for (name, value) in userinfo {
            merged.entry(name).or_insert(value);
        }

        let sub = merged
            .remove("sub")
            .and_then(|v| v.as_str().map(str::to_owned))
            .ok_or_else(|| AppError::auth_invalid("upstream identity is missing a subject"))?;

        // Token-protocol fields are the transaction's, not the identity's
        for transient in ["nonce", "aud", "iss", "iat", "exp", "at_hash", "azp"] {
            merged.remove(transient);
        }

        Ok(UserClaims { sub, extra: merged })
    }
}

/// Decode the claims segment of a compact JWT without verifying its signature
fn decode_jwt_claims(token: &str) -> AppResult<serde_json::Map<String, Value>> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload)) = (segments.next(), segments.next()) else {
        return Err(AppError::auth_invalid("upstream ID token is not a JWT"));
    };

    let decoded = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| AppError::auth_invalid("upstream ID token payload is not base64url"))?;

    match serde_json::from_slice(&decoded) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(AppError::auth_invalid(
            "upstream ID token payload is not a JSON object",
        )),
    }
}
