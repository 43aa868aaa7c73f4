// ABOUTME: OAuth 2.0 HTTP route handlers for the axum web framework
// ABOUTME: Registration, authorization, consent, callback, token, and discovery endpoints
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quarry Search

use super::authorization::AuthorizationFlow;
use super::client_registration::ClientRegistrationManager;
use super::endpoints::TokenEndpoint;
use super::models::{CallbackParams, ConsentForm, OAuth2Error, TokenRequest};
use crate::context::ServerContext;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// OAuth and discovery routes
///
/// CORS is intentionally enabled only on the well-known documents: generic
/// clients must fetch them cross-origin before registering, while the OAuth
/// endpoints themselves are same-origin, server-to-server, or native-client
/// surfaces.
pub fn router(ctx: Arc<ServerContext>) -> Router {
    let well_known = Router::new()
        .route(
            "/.well-known/oauth-authorization-server",
            get(authorization_server_metadata),
        )
        .route(
            "/.well-known/oauth-protected-resource",
            get(protected_resource_metadata),
        )
        .route(
            "/.well-known/oauth-protected-resource/mcp",
            get(protected_resource_metadata),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::OPTIONS])
                .allow_headers(Any),
        );

    Router::new()
        .route("/oauth/register", post(handle_client_registration))
        .route("/oauth/authorize", get(handle_authorization))
        .route("/oauth/consent", post(handle_consent))
        .route("/oauth/callback", get(handle_callback))
        .route("/oauth/token", post(handle_token))
        .merge(well_known)
        .with_state(ctx)
}

/// OAuth 2.0 authorization server metadata (RFC 8414)
async fn authorization_server_metadata(State(ctx): State<Arc<ServerContext>>) -> Response {
    let base = &ctx.config.public_url;
    Json(json!({
        "issuer": base,
        "authorization_endpoint": format!("{base}/oauth/authorize"),
        "token_endpoint": format!("{base}/oauth/token"),
        "registration_endpoint": format!("{base}/oauth/register"),
        "grant_types_supported": ["authorization_code", "refresh_token"],
        "response_types_supported": ["code"],
        "token_endpoint_auth_methods_supported": ["none"],
        "scopes_supported": ["search:read"],
        "response_modes_supported": ["query"],
        "code_challenge_methods_supported": ["S256"]
    }))
    .into_response()
}

/// OAuth 2.0 protected resource metadata (RFC 9728)
async fn protected_resource_metadata(State(ctx): State<Arc<ServerContext>>) -> Response {
    let base = &ctx.config.public_url;
    Json(json!({
        "resource": format!("{base}/mcp"),
        "authorization_servers": [base],
        "scopes_supported": ["search:read"],
        "bearer_methods_supported": ["header"]
    }))
    .into_response()
}

/// Handle client registration (POST /oauth/register)
async fn handle_client_registration(
    State(ctx): State<Arc<ServerContext>>,
    body: axum::body::Bytes,
) -> Response {
    let request = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            let error = OAuth2Error::invalid_client_metadata(&format!(
                "registration request is not valid JSON: {e}"
            ));
            return (StatusCode::BAD_REQUEST, Json(error)).into_response();
        }
    };

    let manager = ClientRegistrationManager::new(
        Arc::clone(&ctx.store),
        ctx.config.allowed_custom_schemes.clone(),
    );

    match manager.register_client(request).await {
        Ok(response) => (StatusCode::CREATED, Json(response)).into_response(),
        Err(error) => (StatusCode::BAD_REQUEST, Json(error)).into_response(),
    }
}

/// Handle authorization request (GET /oauth/authorize)
async fn handle_authorization(
    State(ctx): State<Arc<ServerContext>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    AuthorizationFlow::new(ctx).authorize(params, &headers).await
}

/// Handle consent decision (POST /oauth/consent)
async fn handle_consent(
    State(ctx): State<Arc<ServerContext>>,
    headers: HeaderMap,
    Form(form): Form<ConsentForm>,
) -> Response {
    AuthorizationFlow::new(ctx).consent(form, &headers).await
}

/// Handle upstream IdP callback (GET /oauth/callback)
async fn handle_callback(
    State(ctx): State<Arc<ServerContext>>,
    Query(params): Query<CallbackParams>,
    headers: HeaderMap,
) -> Response {
    AuthorizationFlow::new(ctx).callback(params, &headers).await
}

/// Handle token request (POST /oauth/token)
async fn handle_token(State(ctx): State<Arc<ServerContext>>, body: axum::body::Bytes) -> Response {
    let request: TokenRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            let error = OAuth2Error::invalid_request(&format!("token request is not valid JSON: {e}"));
            return (StatusCode::BAD_REQUEST, Json(error)).into_response();
        }
    };

    match TokenEndpoint::new(ctx).token(request).await {
        Ok(response) => (
            StatusCode::OK,
            // Tokens must never land in any cache
            [
                (header::CACHE_CONTROL, "no-store"),
                (header::PRAGMA, "no-cache"),
            ],
            Json(response),
        )
            .into_response(),
        Err(error) => (error.http_status(), Json(error)).into_response(),
    }
}
