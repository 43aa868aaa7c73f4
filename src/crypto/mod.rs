// ABOUTME: Cryptography module for the authorization core
// ABOUTME: Random token generation, signed state blobs, PKCE verification, and at-rest sealing
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quarry Search

//! Cryptographic utilities for the Quarry authorization server

/// AEAD sealing for at-rest secrets and refresh-token lookup hashing
pub mod keys;
/// PKCE S256 challenge verification (RFC 7636)
pub mod pkce;
/// Secure random token generation
pub mod random;
/// HMAC-signed expiring state blobs
pub mod state;

pub use keys::{hash_refresh_token, TokenCipher};
pub use random::generate_urlsafe_token;
pub use state::StateSigner;
