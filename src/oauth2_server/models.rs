// ABOUTME: OAuth 2.0 wire types for client registration and token exchange
// ABOUTME: Implements RFC 7591 and OAuth 2.0 request/response structures
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quarry Search

use serde::{Deserialize, Serialize};

/// OAuth 2.0 Client Registration Request (RFC 7591)
#[derive(Debug, Deserialize)]
pub struct ClientRegistrationRequest {
    /// Redirect URIs for the authorization code flow
    pub redirect_uris: Vec<String>,
    /// Optional client name for display
    pub client_name: Option<String>,
    /// Optional client URI for information
    pub client_uri: Option<String>,
    /// Grant types the client can use
    pub grant_types: Option<Vec<String>>,
    /// Response types the client can use
    pub response_types: Option<Vec<String>>,
    /// Token endpoint auth method; only `"none"` is accepted
    pub token_endpoint_auth_method: Option<String>,
    /// Scopes the client can request
    pub scope: Option<String>,
}

/// OAuth 2.0 Client Registration Response (RFC 7591)
#[derive(Debug, Serialize, Deserialize)]
pub struct ClientRegistrationResponse {
    /// Unique client identifier
    pub client_id: String,
    /// When the client id was issued
    pub client_id_issued_at: i64,
    /// Redirect URIs registered for this client
    pub redirect_uris: Vec<String>,
    /// Grant types allowed for this client
    pub grant_types: Vec<String>,
    /// Response types allowed for this client
    pub response_types: Vec<String>,
    /// Token endpoint auth method; always `"none"`
    pub token_endpoint_auth_method: String,
    /// Client name
    pub client_name: Option<String>,
    /// Client URI
    pub client_uri: Option<String>,
    /// Scopes this client can request
    pub scope: Option<String>,
}

/// OAuth 2.0 Authorization Request
///
/// Serializable so the original request can travel inside signed state blobs
/// across the upstream login round-trip and the consent form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizeRequest {
    /// Response type; must be `code` when present
    pub response_type: Option<String>,
    /// Client identifier
    pub client_id: String,
    /// Redirect URI for the response
    pub redirect_uri: String,
    /// Requested scopes
    pub scope: Option<String>,
    /// Opaque client state, echoed back on every redirect
    pub state: Option<String>,
    /// PKCE code challenge (RFC 7636)
    pub code_challenge: Option<String>,
    /// PKCE code challenge method; must be S256 when present
    pub code_challenge_method: Option<String>,
    /// Resource indicator for the minted tokens
    pub resource: Option<String>,
}

/// OAuth 2.0 Token Request
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    /// Grant type (`authorization_code`, `refresh_token`)
    pub grant_type: String,
    /// Client ID; public-client auth, no secret
    pub client_id: String,
    /// Authorization code (for `authorization_code` grant)
    pub code: Option<String>,
    /// Redirect URI (must match what the code was issued for)
    pub redirect_uri: Option<String>,
    /// PKCE code verifier (RFC 7636, for `authorization_code` grant)
    pub code_verifier: Option<String>,
    /// Refresh token (for `refresh_token` grant)
    pub refresh_token: Option<String>,
    /// Resource indicator for the minted tokens
    pub resource: Option<String>,
}

/// OAuth 2.0 Token Response
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Access token (JWT)
    pub access_token: String,
    /// Token type (always "Bearer")
    pub token_type: String,
    /// Expires in seconds
    pub expires_in: i64,
    /// Refresh token for rotation
    pub refresh_token: Option<String>,
    /// Scopes granted
    pub scope: Option<String>,
}

/// OAuth 2.0 Error Response
#[derive(Debug, Serialize, Deserialize)]
pub struct OAuth2Error {
    /// Error code
    pub error: String,
    /// Human-readable error description
    pub error_description: Option<String>,
    /// URI for error information
    pub error_uri: Option<String>,
}

impl OAuth2Error {
    /// Create an `invalid_request` error
    #[must_use]
    pub fn invalid_request(description: &str) -> Self {
        Self {
            error: "invalid_request".to_owned(),
            error_description: Some(description.to_owned()),
            error_uri: Some(
                "https://datatracker.ietf.org/doc/html/rfc6749#section-4.1.2.1".to_owned(),
            ),
        }
    }

    /// Create an `invalid_client` error
    #[must_use]
    pub fn invalid_client() -> Self {
        Self {
            error: "invalid_client".to_owned(),
            error_description: Some("Client authentication failed".to_owned()),
            error_uri: Some("https://datatracker.ietf.org/doc/html/rfc6749#section-5.2".to_owned()),
        }
    }

    /// Create an `invalid_grant` error
    #[must_use]
    pub fn invalid_grant(description: &str) -> Self {
        Self {
            error: "invalid_grant".to_owned(),
            error_description: Some(description.to_owned()),
            error_uri: Some("https://datatracker.ietf.org/doc/html/rfc6749#section-5.2".to_owned()),
        }
    }

    /// Create an `unsupported_grant_type` error
    #[must_use]
    pub fn unsupported_grant_type() -> Self {
        Self {
            error: "unsupported_grant_type".to_owned(),
            error_description: Some("Grant type not supported".to_owned()),
            error_uri: Some("https://datatracker.ietf.org/doc/html/rfc6749#section-5.2".to_owned()),
        }
    }

    /// Create an `unauthorized_client` error (RFC 6749 Section 4.1.2.1)
    #[must_use]
    pub fn unauthorized_client(description: &str) -> Self {
        Self {
            error: "unauthorized_client".to_owned(),
            error_description: Some(description.to_owned()),
            error_uri: Some(
                "https://datatracker.ietf.org/doc/html/rfc6749#section-4.1.2.1".to_owned(),
            ),
        }
    }

    /// Create an `invalid_client_metadata` error (RFC 7591 Section 3.2.2)
    #[must_use]
    pub fn invalid_client_metadata(description: &str) -> Self {
        Self {
            error: "invalid_client_metadata".to_owned(),
            error_description: Some(description.to_owned()),
            error_uri: Some(
                "https://datatracker.ietf.org/doc/html/rfc7591#section-3.2.2".to_owned(),
            ),
        }
    }

    /// Create an `invalid_redirect_uri` error (RFC 7591 Section 3.2.2)
    #[must_use]
    pub fn invalid_redirect_uri(description: &str) -> Self {
        Self {
            error: "invalid_redirect_uri".to_owned(),
            error_description: Some(description.to_owned()),
            error_uri: Some(
                "https://datatracker.ietf.org/doc/html/rfc7591#section-3.2.2".to_owned(),
            ),
        }
    }

    /// Create a `slow_down` error: a concurrent rotation holds the lock and
    /// the caller should retry shortly
    #[must_use]
    pub fn slow_down() -> Self {
        Self {
            error: "slow_down".to_owned(),
            error_description: Some(
                "A concurrent refresh is in flight for this token; retry shortly".to_owned(),
            ),
            error_uri: None,
        }
    }

    /// HTTP status this error is served with
    #[must_use]
    pub fn http_status(&self) -> http::StatusCode {
        if self.error == "slow_down" {
            http::StatusCode::TOO_MANY_REQUESTS
        } else {
            http::StatusCode::BAD_REQUEST
        }
    }
}

/// Consent form submission (POST /oauth/consent)
#[derive(Debug, Deserialize)]
pub struct ConsentForm {
    /// `approve` or `deny`
    pub decision: String,
    /// Signed blob carrying the original authorization request
    pub consent_state: String,
}

/// Upstream callback query parameters (GET /oauth/callback)
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    /// Upstream authorization code; absent when the provider reports an error
    pub code: Option<String>,
    /// Signed blob carrying the transaction id and original request
    pub state: String,
    /// Upstream error code, if the login failed there
    pub error: Option<String>,
}
