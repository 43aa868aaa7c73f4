// ABOUTME: HMAC-signed expiring state blobs for redirect chains and cookies
// ABOUTME: Carries request state across untrusted hops without server-side lookup
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quarry Search

use crate::errors::{AppError, AppResult};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use ring::hmac;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Wire envelope: the payload plus its validity window
#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    payload: T,
    issued_at: i64,
    expires_at: i64,
}

/// Signs and verifies opaque expiring state tokens
///
/// Token layout is `base64url(json(envelope)) + "." + base64url(hmac_sha256(body))`.
/// Verification recomputes the tag in constant time before the envelope is
/// even parsed, so tampered input is rejected without touching its contents.
pub struct StateSigner {
    key: hmac::Key,
}

impl StateSigner {
    /// Create a signer from a shared secret
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
        }
    }

    /// Serialize and sign `payload` with the given validity window
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized
    pub fn sign<T: Serialize>(&self, payload: &T, ttl: Duration) -> AppResult<String> {
        let now = Utc::now();
        let envelope = Envelope {
            payload,
            issued_at: now.timestamp(),
            expires_at: (now + ttl).timestamp(),
        };
        let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&envelope)?);
        let tag = hmac::sign(&self.key, body.as_bytes());
        Ok(format!("{body}.{}", URL_SAFE_NO_PAD.encode(tag.as_ref())))
    }

    /// Verify a token's signature and validity window, returning its payload
    ///
    /// # Errors
    ///
    /// Returns `AuthInvalid` on malformed or tampered tokens and `AuthExpired`
    /// once the embedded validity window has passed
    pub fn verify<T: DeserializeOwned>(&self, token: &str) -> AppResult<T> {
        let (body, tag) = token
            .split_once('.')
            .ok_or_else(|| AppError::auth_invalid("malformed state token"))?;

        let tag_bytes = URL_SAFE_NO_PAD
            .decode(tag)
            .map_err(|_| AppError::auth_invalid("malformed state signature"))?;

        hmac::verify(&self.key, body.as_bytes(), &tag_bytes)
            .map_err(|_| AppError::auth_invalid("state signature mismatch"))?;

        let envelope: Envelope<T> = serde_json::from_slice(
            &URL_SAFE_NO_PAD
                .decode(body)
                .map_err(|_| AppError::auth_invalid("malformed state body"))?,
        )
        .map_err(|_| AppError::auth_invalid("malformed state payload"))?;

        if envelope.expires_at < Utc::now().timestamp() {
            return Err(AppError::auth_expired("state token expired"));
        }

        Ok(envelope.payload)
    }
}
