// ABOUTME: PKCE S256 challenge computation and verification (RFC 7636)
// ABOUTME: Only the S256 method is supported; the plain method is rejected
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quarry Search

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Check a code verifier against RFC 7636 Section 4.1 format rules
///
/// # Errors
///
/// Returns a static description of the violated rule
pub fn validate_verifier_format(verifier: &str) -> Result<(), &'static str> {
    // Length: 43-128 characters
    if verifier.len() < 43 || verifier.len() > 128 {
        return Err("code_verifier must be between 43 and 128 characters");
    }

    // Only unreserved characters allowed: [A-Z] / [a-z] / [0-9] / "-" / "." / "_" / "~"
    if !verifier
        .chars()
        .all(|c| matches!(c, 'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '.' | '_' | '~'))
    {
        return Err("code_verifier contains characters outside the RFC 7636 unreserved set");
    }

    Ok(())
}

/// Compute the S256 challenge for a verifier: `base64url(sha256(verifier))`
#[must_use]
pub fn challenge_s256(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Verify a code verifier against a stored S256 challenge
///
/// Comparison is constant-time to prevent timing attacks.
#[must_use]
pub fn verify_s256(verifier: &str, challenge: &str) -> bool {
    let computed = challenge_s256(verifier);
    computed.as_bytes().ct_eq(challenge.as_bytes()).into()
}
