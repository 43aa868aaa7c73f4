// ABOUTME: OIDC provider discovery with per-issuer caching
// ABOUTME: Fetches the well-known configuration once and reuses it for every login
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quarry Search

use crate::errors::{AppError, AppResult};
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::info;

/// The subset of the OIDC discovery document this server consumes
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryDocument {
    /// Issuer identifier; must match the configured issuer
    pub issuer: String,
    /// Where browsers are sent to log in
    pub authorization_endpoint: String,
    /// Where authorization codes are redeemed
    pub token_endpoint: String,
    /// Where user claims can be fetched with an upstream access token
    pub userinfo_endpoint: Option<String>,
    /// Scopes the provider advertises
    pub scopes_supported: Option<Vec<String>>,
}

/// Discovery cache keyed by the configured issuer
///
/// The document is fetched at most once per process and is immutable after
/// that; concurrent first requests coalesce on the cell.
pub struct ProviderDirectory {
    issuer: String,
    http: reqwest::Client,
    cached: OnceCell<DiscoveryDocument>,
}

impl ProviderDirectory {
    /// Create a directory for the given issuer
    #[must_use]
    pub fn new(issuer: String, http: reqwest::Client) -> Self {
        Self {
            issuer,
            http,
            cached: OnceCell::new(),
        }
    }

    /// Create a directory with a pre-resolved document; used by tests and
    /// deployments that pin the provider configuration
    #[must_use]
    pub fn with_document(issuer: String, http: reqwest::Client, doc: DiscoveryDocument) -> Self {
        Self {
            issuer,
            http,
            cached: OnceCell::new_with(Some(doc)),
        }
    }

    /// The configured issuer URL
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Fetch (or return the cached) discovery document
    ///
    /// # Errors
    ///
    /// Returns an error if the well-known endpoint cannot be fetched or parsed
    pub async fn discover(&self) -> AppResult<&DiscoveryDocument> {
        self.cached
            .get_or_try_init(|| async {
                let url = format!("{}/.well-known/openid-configuration", self.issuer);
                info!(issuer = %self.issuer, "fetching upstream provider configuration");

                let doc: DiscoveryDocument = self
                    .http
                    .get(&url)
                    .send()
                    .await?
                    .error_for_status()
                    .map_err(|e| {
                        AppError::external_service("upstream discovery", e.to_string())
                    })?
                    .json()
                    .await?;

                Ok(doc)
            })
            .await
    }
}
