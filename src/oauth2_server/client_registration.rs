// ABOUTME: OAuth 2.0 dynamic client registration implementation (RFC 7591)
// ABOUTME: Validates redirect URIs and registers public MCP clients at runtime
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quarry Search

use super::models::{ClientRegistrationRequest, ClientRegistrationResponse, OAuth2Error};
use crate::errors::AppResult;
use crate::models::ClientMetadata;
use crate::storage::AuthStore;
use chrono::Utc;
use std::sync::Arc;
use url::{Host, Url};
use uuid::Uuid;

/// The only supported token endpoint auth method: public clients with PKCE
const AUTH_METHOD_NONE: &str = "none";

/// OAuth 2.0 Client Registration Manager
pub struct ClientRegistrationManager {
    store: Arc<dyn AuthStore>,
    allowed_custom_schemes: Vec<String>,
}

impl ClientRegistrationManager {
    /// Creates a new client registration manager
    #[must_use]
    pub fn new(store: Arc<dyn AuthStore>, allowed_custom_schemes: Vec<String>) -> Self {
        Self {
            store,
            allowed_custom_schemes,
        }
    }

    /// Register a new OAuth 2.0 client (RFC 7591)
    ///
    /// # Errors
    ///
    /// Returns a structured registration error if validation fails or the
    /// client cannot be persisted
    pub async fn register_client(
        &self,
        request: ClientRegistrationRequest,
    ) -> Result<ClientRegistrationResponse, OAuth2Error> {
        self.validate_registration_request(&request)?;

        let client_id = Self::generate_client_id();

        let grant_types = request
            .grant_types
            .unwrap_or_else(|| vec!["authorization_code".to_owned(), "refresh_token".to_owned()]);
        let response_types = request
            .response_types
            .unwrap_or_else(|| vec!["code".to_owned()]);

        if !grant_types.iter().any(|g| g == "authorization_code") {
            return Err(OAuth2Error::invalid_client_metadata(
                "grant_types must include authorization_code",
            ));
        }
        if !response_types.iter().any(|r| r == "code") {
            return Err(OAuth2Error::invalid_client_metadata(
                "response_types must include code",
            ));
        }

        let created_at = Utc::now();
        let client = ClientMetadata {
            client_id: client_id.clone(),
            client_name: request.client_name.clone(),
            client_uri: request.client_uri.clone(),
            redirect_uris: request.redirect_uris.clone(),
            grant_types: grant_types.clone(),
            response_types: response_types.clone(),
            token_endpoint_auth_method: AUTH_METHOD_NONE.to_owned(),
            scope: request.scope.clone(),
            created_at,
        };

        self.store.create_client(&client).await.map_err(|e| {
            tracing::error!(client_id = %client_id, "failed to store client registration: {e}");
            OAuth2Error::invalid_request("Failed to store client registration")
        })?;

        tracing::info!(
            client_id = %client_id,
            redirect_uris = request.redirect_uris.len(),
            "registered OAuth client"
        );

        Ok(ClientRegistrationResponse {
            client_id,
            client_id_issued_at: created_at.timestamp(),
            redirect_uris: request.redirect_uris,
            grant_types,
            response_types,
            token_endpoint_auth_method: AUTH_METHOD_NONE.to_owned(),
            client_name: request.client_name,
            client_uri: request.client_uri,
            scope: request.scope,
        })
    }

    /// Fetch client metadata by id
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails
    pub async fn get_client(&self, client_id: &str) -> AppResult<Option<ClientMetadata>> {
        self.store.get_client(client_id).await
    }

    fn validate_registration_request(
        &self,
        request: &ClientRegistrationRequest,
    ) -> Result<(), OAuth2Error> {
        if request.redirect_uris.is_empty() {
            return Err(OAuth2Error::invalid_redirect_uri(
                "at least one redirect_uri is required",
            ));
        }

        for uri in &request.redirect_uris {
            self.validate_redirect_uri(uri)?;
        }

        if let Some(method) = request.token_endpoint_auth_method.as_deref() {
            if method != AUTH_METHOD_NONE {
                return Err(OAuth2Error::invalid_client_metadata(
                    "only the 'none' token_endpoint_auth_method is supported (public clients)",
                ));
            }
        }

        Ok(())
    }

    /// Redirect URIs must be https, loopback http, or a recognized custom
    /// scheme for native clients; everything else is rejected
    fn validate_redirect_uri(&self, uri: &str) -> Result<(), OAuth2Error> {
        let parsed = Url::parse(uri).map_err(|_| {
            OAuth2Error::invalid_redirect_uri(&format!("redirect_uri is not a valid URI: {uri}"))
        })?;

        match parsed.scheme() {
            "https" => Ok(()),
            "http" => match parsed.host() {
                Some(Host::Domain(domain)) if domain == "localhost" => Ok(()),
                Some(Host::Ipv4(ip)) if ip.is_loopback() => Ok(()),
                Some(Host::Ipv6(ip)) if ip.is_loopback() => Ok(()),
                _ => Err(OAuth2Error::invalid_redirect_uri(
                    "http redirect_uris are only allowed for loopback addresses",
                )),
            },
            scheme if self.allowed_custom_schemes.iter().any(|s| s == scheme) => Ok(()),
            scheme => Err(OAuth2Error::invalid_redirect_uri(&format!(
                "redirect_uri scheme '{scheme}' is not allowed"
            ))),
        }
    }

    fn generate_client_id() -> String {
        format!("mcp_{}", Uuid::new_v4().simple())
    }
}
