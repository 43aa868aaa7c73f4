// ABOUTME: Shared helpers for integration tests
// ABOUTME: Builds an in-memory server context with a pinned upstream provider configuration
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quarry Search

#![allow(dead_code)]
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use chrono::{Duration, Utc};
use quarry_mcp_server::config::{
    ServerConfig, StorageBackend, StorageConfig, UpstreamConfig,
};
use quarry_mcp_server::context::ServerContext;
use quarry_mcp_server::models::{AuthorizationCode, UserClaims, UserSession};
use quarry_mcp_server::routes::build_router;
use quarry_mcp_server::storage::{memory::MemoryAuthStore, AuthStore};
use quarry_mcp_server::upstream::{DiscoveryDocument, ProviderDirectory, UpstreamClient};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

pub const TOKEN_SECRET: &str = "test-token-secret-0123456789abcdef0123456789";
pub const COOKIE_SECRET: &str = "test-cookie-secret-0123456789abcdef012345678";
pub const PUBLIC_URL: &str = "http://auth.example.test";
pub const UPSTREAM_ISSUER: &str = "https://idp.example.test";

pub fn test_config() -> ServerConfig {
    ServerConfig {
        http_port: 0,
        public_url: PUBLIC_URL.to_owned(),
        token_secret: TOKEN_SECRET.to_owned(),
        cookie_secret: COOKIE_SECRET.to_owned(),
        upstream: UpstreamConfig {
            issuer: UPSTREAM_ISSUER.to_owned(),
            client_id: "quarry-upstream-client".to_owned(),
            client_secret: "quarry-upstream-secret".to_owned(),
            scopes: vec!["openid".to_owned(), "email".to_owned()],
        },
        required_claims: vec!["sub".to_owned(), "email".to_owned()],
        allowed_custom_schemes: vec!["quarry".to_owned(), "vscode".to_owned()],
        storage: StorageConfig {
            backend: StorageBackend::Memory,
            redis_url: None,
        },
        access_token_ttl_secs: 3600,
        refresh_token_ttl_days: 30,
        session_ttl_days: 30,
        debug_endpoint: false,
    }
}

/// Discovery document pointing at the pinned test issuer; tests that drive
/// the upstream exchange overwrite the endpoints with a local mock server
pub fn test_discovery(token_endpoint: &str, userinfo_endpoint: Option<&str>) -> DiscoveryDocument {
    serde_json::from_value(json!({
        "issuer": UPSTREAM_ISSUER,
        "authorization_endpoint": format!("{UPSTREAM_ISSUER}/authorize"),
        "token_endpoint": token_endpoint,
        "userinfo_endpoint": userinfo_endpoint,
        "scopes_supported": ["openid", "email", "profile"],
    }))
    .unwrap()
}

pub fn test_context_with(config: ServerConfig, discovery: DiscoveryDocument) -> Arc<ServerContext> {
    let store: Arc<dyn AuthStore> = Arc::new(MemoryAuthStore::new());
    let directory = ProviderDirectory::with_document(
        config.upstream.issuer.clone(),
        reqwest::Client::new(),
        discovery,
    );
    let upstream = UpstreamClient::with_directory(config.upstream.clone(), directory);
    Arc::new(ServerContext::with_upstream(config, store, upstream))
}

pub fn test_context() -> Arc<ServerContext> {
    test_context_with(
        test_config(),
        test_discovery(&format!("{UPSTREAM_ISSUER}/token"), None),
    )
}

pub fn test_app(ctx: &Arc<ServerContext>) -> Router {
    build_router(Arc::clone(ctx))
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> Response<Body> {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    app.clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

/// Register a client through the real endpoint and return its client_id
pub async fn register_client(app: &Router, redirect_uri: &str) -> String {
    let response = post_json(
        app,
        "/oauth/register",
        json!({
            "redirect_uris": [redirect_uri],
            "client_name": "Test Search Client",
        }),
    )
    .await;
    assert_eq!(response.status(), 201);
    let body = body_json(response).await;
    body["client_id"].as_str().unwrap().to_owned()
}

pub fn test_claims() -> UserClaims {
    serde_json::from_value(json!({
        "sub": "user-1",
        "email": "user@example.com",
        "name": "Test User",
    }))
    .unwrap()
}

/// Seed an authorization code directly in the store, bound to a PKCE challenge
pub async fn seed_auth_code(
    ctx: &Arc<ServerContext>,
    client_id: &str,
    redirect_uri: &str,
    code_challenge: &str,
    claims: &UserClaims,
) -> String {
    let code = format!("test-code-{}", uuid::Uuid::new_v4().simple());
    ctx.store
        .put_auth_code(&AuthorizationCode {
            code: code.clone(),
            client_id: client_id.to_owned(),
            redirect_uri: redirect_uri.to_owned(),
            code_challenge: code_challenge.to_owned(),
            code_challenge_method: "S256".to_owned(),
            scope: Some("search:read".to_owned()),
            resource: None,
            user_claims: claims.clone(),
            expires_at: Utc::now() + Duration::minutes(5),
        })
        .await
        .unwrap();
    code
}

/// Seed a browser session and return the signed cookie header value
pub async fn seed_session(ctx: &Arc<ServerContext>, claims: &UserClaims) -> (UserSession, String) {
    let session = UserSession {
        session_id: format!("test-session-{}", uuid::Uuid::new_v4().simple()),
        user_claims: claims.clone(),
        upstream_refresh_token_enc: None,
        created_at: Utc::now(),
        expires_at: Utc::now() + Duration::days(30),
    };
    ctx.store.put_session(&session).await.unwrap();

    let signed = ctx
        .state_signer
        .sign(
            &json!({ "session_id": session.session_id }),
            Duration::days(30),
        )
        .unwrap();
    (session, format!("quarry_session={signed}"))
}
