// ABOUTME: Access token minting and validation for the authorization server
// ABOUTME: HS256 JWTs carrying the bound user claims plus standard issuer/audience fields
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quarry Search

use crate::errors::{AppError, AppResult};
use crate::models::UserClaims;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Detailed validation failure classification
#[derive(Debug)]
pub enum JwtValidationError {
    /// Token was valid but its expiry has passed
    TokenExpired,
    /// Token signature, issuer, or audience check failed
    TokenInvalid {
        /// Which check failed
        reason: String,
    },
    /// Token is not parseable as a JWT at all
    TokenMalformed {
        /// Parser detail
        details: String,
    },
}

impl std::fmt::Display for JwtValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TokenExpired => write!(f, "JWT token has expired"),
            Self::TokenInvalid { reason } => write!(f, "JWT token is invalid: {reason}"),
            Self::TokenMalformed { details } => write!(f, "JWT token is malformed: {details}"),
        }
    }
}

impl std::error::Error for JwtValidationError {}

/// Claims carried by a minted access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject: the authenticated user
    pub sub: String,
    /// Issuer: this server's public URL
    pub iss: String,
    /// Audience: this server's public URL, or the requested resource
    pub aud: String,
    /// Client the token was minted for
    pub client_id: String,
    /// Space-separated granted scopes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Issued-at timestamp
    pub iat: i64,
    /// Expiry timestamp
    pub exp: i64,
    /// Unique token id
    pub jti: String,
    /// All additional identity claims, passed through verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl AccessTokenClaims {
    /// Look up a claim by name across the well-known and pass-through fields
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        match name {
            "sub" => Some(Value::String(self.sub.clone())),
            "iss" => Some(Value::String(self.iss.clone())),
            "aud" => Some(Value::String(self.aud.clone())),
            "client_id" => Some(Value::String(self.client_id.clone())),
            "scope" => self.scope.clone().map(Value::String),
            "iat" => Some(Value::from(self.iat)),
            "exp" => Some(Value::from(self.exp)),
            "jti" => Some(Value::String(self.jti.clone())),
            _ => self.extra.get(name).cloned(),
        }
    }

    /// First required claim that is absent, if any
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

/// Mints and validates HS256 access tokens
pub struct TokenManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    access_token_ttl: Duration,
}

impl TokenManager {
    /// Create a token manager signing with the given secret
    #[must_use]
    pub fn new(secret: &[u8], issuer: String, access_token_ttl_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer,
            access_token_ttl: Duration::seconds(access_token_ttl_secs),
        }
    }

    /// Access token lifetime in seconds, as advertised in `expires_in`
    #[must_use]
    pub fn access_token_ttl_secs(&self) -> i64 {
        self.access_token_ttl.num_seconds()
    }

    /// Mint a signed access token binding the given identity
    ///
    /// # Errors
    ///
    /// Returns an error if JWT encoding fails
    pub fn mint_access_token(
        &self,
        user_claims: &UserClaims,
        client_id: &str,
        scope: Option<&str>,
        resource: Option<&str>,
    ) -> AppResult<String> {
        let now = Utc::now();
        let claims = AccessTokenClaims {
            sub: user_claims.sub.clone(),
            iss: self.issuer.clone(),
            aud: resource.unwrap_or(&self.issuer).to_owned(),
            client_id: client_id.to_owned(),
            scope: scope.map(str::to_owned),
            iat: now.timestamp(),
            exp: (now + self.access_token_ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
            extra: user_claims.extra.clone(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("failed to encode access token: {e}")))
    }

    /// Validate a bearer token's signature, issuer, audience, and expiry
    ///
    /// # Errors
    ///
    /// Returns a classified validation error; the caller maps it onto the
    /// appropriate `WWW-Authenticate` challenge
    pub fn validate_access_token(
        &self,
        token: &str,
    ) -> Result<AccessTokenClaims, JwtValidationError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        // Clients following RFC 9728 send the protected-resource URL as the
        // resource indicator; tokens minted for it carry that audience.
        validation.set_audience(&[self.issuer.clone(), format!("{}/mcp", self.issuer)]);

        match decode::<AccessTokenClaims>(token, &self.decoding_key, &validation) {
            Ok(data) => Ok(data.claims),
            Err(e) => match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    Err(JwtValidationError::TokenExpired)
                }
                jsonwebtoken::errors::ErrorKind::InvalidSignature
                | jsonwebtoken::errors::ErrorKind::InvalidIssuer
                | jsonwebtoken::errors::ErrorKind::InvalidAudience => {
                    Err(JwtValidationError::TokenInvalid {
                        reason: e.to_string(),
                    })
                }
                _ => Err(JwtValidationError::TokenMalformed {
                    details: e.to_string(),
                }),
            },
        }
    }
}
