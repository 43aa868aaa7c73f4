// ABOUTME: OAuth 2.0 authorization server protecting the MCP endpoint
// ABOUTME: RFC 7591 client registration, PKCE authorization codes, and rotating refresh tokens
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quarry Search

/// Browser-facing authorization state machine
pub mod authorization;
/// RFC 7591 dynamic client registration
pub mod client_registration;
/// Token endpoint with PKCE verification and refresh rotation
pub mod endpoints;
/// OAuth 2.0 data models and request/response types
pub mod models;
/// HTTP route handlers
pub mod routes;

pub use authorization::AuthorizationFlow;
pub use client_registration::ClientRegistrationManager;
pub use endpoints::TokenEndpoint;
pub use models::{
    AuthorizeRequest, ClientRegistrationRequest, ClientRegistrationResponse, OAuth2Error,
    TokenRequest, TokenResponse,
};
