// ABOUTME: Secure random token generation for codes, session ids, and refresh tokens
// ABOUTME: Uses the system RNG; failure here means the server cannot operate securely
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quarry Search

use crate::errors::{AppError, AppResult};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ring::rand::{SecureRandom, SystemRandom};

/// Generate `len` random bytes and return them URL-safe base64 encoded
///
/// # Errors
///
/// Returns an error if the system RNG fails - this is a critical security
/// failure and the server cannot operate securely without working RNG
pub fn generate_urlsafe_token(len: usize) -> AppResult<String> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; len];

    rng.fill(&mut bytes).map_err(|e| {
        tracing::error!("CRITICAL: SystemRandom failed - cannot generate secure random bytes: {e}");
        AppError::internal("System RNG failure - server cannot operate securely")
    })?;

    Ok(URL_SAFE_NO_PAD.encode(&bytes))
}
