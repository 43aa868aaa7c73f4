// ABOUTME: Persistent record types for the OAuth 2.0 authorization core
// ABOUTME: Client metadata, authorization codes, refresh tokens, sessions, and login transactions
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quarry Search

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identity claims bound into codes, refresh tokens, and sessions
///
/// `sub` is the one claim every identity must carry; everything else the
/// upstream provider asserts is preserved in `extra` and passed through into
/// minted access tokens without requiring a closed schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserClaims {
    /// Subject identifier from the upstream provider
    pub sub: String,
    /// All additional claims, preserved verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl UserClaims {
    /// Look up a claim by name, treating `sub` as a regular claim
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        if name == "sub" {
            if self.sub.is_empty() {
                return None;
            }
            return Some(Value::String(self.sub.clone()));
        }
        self.extra.get(name).cloned()
    }

    /// First required claim that is absent or empty, if any
    #[must_use]
    pub fn missing_required<'a>(&self, required: &'a [String]) -> Option<&'a str> {
        required
            .iter()
            .find(|name| match self.get(name) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.is_empty(),
                Some(_) => false,
            })
            .map(String::as_str)
    }
}

/// Registered OAuth 2.0 client (RFC 7591)
///
/// Created once by dynamic client registration and immutable thereafter.
/// Only public clients are supported: there is no client secret field because
/// this server never issues one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMetadata {
    /// Server-generated opaque client identifier
    pub client_id: String,
    /// Optional display name
    pub client_name: Option<String>,
    /// Optional informational URI
    pub client_uri: Option<String>,
    /// Registered redirect URIs; non-empty, validated at registration
    pub redirect_uris: Vec<String>,
    /// Grant types the client may use
    pub grant_types: Vec<String>,
    /// Response types the client may use
    pub response_types: Vec<String>,
    /// Token endpoint auth method; always `"none"`
    pub token_endpoint_auth_method: String,
    /// Default scope granted to the client
    pub scope: Option<String>,
    /// Registration timestamp
    pub created_at: DateTime<Utc>,
}

/// Single-use authorization code bound to a PKCE challenge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    /// The code value; primary key
    pub code: String,
    /// Client the code was issued to
    pub client_id: String,
    /// Redirect URI the code was issued for; must match on exchange
    pub redirect_uri: String,
    /// PKCE code challenge (S256)
    pub code_challenge: String,
    /// PKCE challenge method; always `"S256"`
    pub code_challenge_method: String,
    /// Scope approved for this authorization
    pub scope: Option<String>,
    /// Target resource indicator, if the client supplied one
    pub resource: Option<String>,
    /// Authenticated identity to bind into minted tokens
    pub user_claims: UserClaims,
    /// Expiry; codes live for minutes
    pub expires_at: DateTime<Utc>,
}

/// Refresh token record, stored under a one-way hash of the token value
///
/// The plaintext token is only ever held by the client; the record never
/// contains the redeemable secret itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    /// HMAC of the token value; primary key
    pub token_hash: String,
    /// Client the token was issued to
    pub client_id: String,
    /// Scope carried forward across rotations
    pub scope: Option<String>,
    /// Target resource indicator carried forward across rotations
    pub resource: Option<String>,
    /// Authenticated identity to bind into minted tokens
    pub user_claims: UserClaims,
    /// Issuance timestamp
    pub created_at: DateTime<Utc>,
    /// Expiry; refresh tokens live for weeks
    pub expires_at: DateTime<Utc>,
}

/// Browser session established after a successful upstream login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSession {
    /// Opaque session identifier; the signed cookie carries this, not the claims
    pub session_id: String,
    /// Identity established by the upstream login
    pub user_claims: UserClaims,
    /// Upstream refresh token, AEAD-sealed before persistence
    pub upstream_refresh_token_enc: Option<Vec<u8>>,
    /// Login timestamp
    pub created_at: DateTime<Utc>,
    /// Expiry; sessions live for weeks
    pub expires_at: DateTime<Utc>,
}

/// Short-lived record tracking one in-flight upstream login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginTransaction {
    /// Transaction identifier; primary key
    pub tx_id: String,
    /// PKCE verifier sent to the upstream provider on exchange
    pub pkce_verifier: String,
    /// Nonce expected back in the upstream ID token
    pub nonce: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Expiry; transactions live for minutes
    pub expires_at: DateTime<Utc>,
}
