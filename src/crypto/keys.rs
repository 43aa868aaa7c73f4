// ABOUTME: AEAD sealing for at-rest secrets and refresh-token lookup hashing
// ABOUTME: AES-256-GCM with a random nonce prepended to each ciphertext
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quarry Search

use crate::errors::{AppError, AppResult};
use ring::hmac;
use sha2::{Digest, Sha256};

/// Symmetric cipher protecting secrets persisted inside storage records
///
/// A storage-backend compromise alone must not leak upstream credentials, so
/// anything secret that lands in a record goes through `seal` first.
pub struct TokenCipher {
    key: [u8; 32],
}

impl TokenCipher {
    /// Derive a 256-bit key from the server secret
    #[must_use]
    pub fn from_secret(secret: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        let digest = hasher.finalize();
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self { key }
    }

    /// Encrypt plaintext, prepending the random 96-bit nonce to the ciphertext
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails
    pub fn seal(&self, plaintext: &[u8]) -> AppResult<Vec<u8>> {
        use aes_gcm::aead::generic_array::GenericArray;
        use aes_gcm::{aead::Aead, Aes256Gcm, KeyInit};
        use rand::RngCore;

        let cipher = Aes256Gcm::new(GenericArray::from_slice(&self.key));

        let mut nonce_bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = GenericArray::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| AppError::internal(format!("encryption failed: {e}")))?;

        let mut result = Vec::with_capacity(12 + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);

        Ok(result)
    }

    /// Decrypt data produced by `seal`
    ///
    /// # Errors
    ///
    /// Returns an error if the input is too short to carry a nonce or if
    /// authentication fails (wrong key or tampered data)
    pub fn open(&self, sealed: &[u8]) -> AppResult<Vec<u8>> {
        use aes_gcm::aead::generic_array::GenericArray;
        use aes_gcm::{aead::Aead, Aes256Gcm, KeyInit};

        if sealed.len() < 12 {
            return Err(AppError::invalid_input("sealed data too short"));
        }

        let cipher = Aes256Gcm::new(GenericArray::from_slice(&self.key));
        let nonce = GenericArray::from_slice(&sealed[..12]);

        cipher
            .decrypt(nonce, &sealed[12..])
            .map_err(|e| AppError::internal(format!("decryption failed: {e}")))
    }
}

/// One-way lookup hash for refresh tokens
///
/// Keyed HMAC rather than a bare hash: the stored key never contains the
/// redeemable secret, and offline dictionary attacks against the key space
/// require the server secret as well.
#[must_use]
pub fn hash_refresh_token(secret: &str, token: &str) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    let tag = hmac::sign(&key, token.as_bytes());
    hex::encode(tag.as_ref())
}
