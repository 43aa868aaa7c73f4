// ABOUTME: Tests for dynamic client registration (RFC 7591)
// ABOUTME: Redirect URI allowlisting, public-client enforcement, and response shape
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quarry Search

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use serde_json::json;

#[tokio::test]
async fn test_registration_returns_201_with_metadata() {
    let ctx = common::test_context();
    let app = common::test_app(&ctx);

    let response = common::post_json(
        &app,
        "/oauth/register",
        json!({
            "redirect_uris": ["https://client.example.com/callback"],
            "client_name": "Example Search Client",
            "scope": "search:read",
        }),
    )
    .await;

    assert_eq!(response.status(), 201);
    let body = common::body_json(response).await;
    assert!(body["client_id"].as_str().unwrap().starts_with("mcp_"));
    assert_eq!(
        body["redirect_uris"],
        json!(["https://client.example.com/callback"])
    );
    assert_eq!(body["token_endpoint_auth_method"], "none");
    assert_eq!(body["client_name"], "Example Search Client");
    assert_eq!(body["scope"], "search:read");
    assert!(body["grant_types"]
        .as_array()
        .unwrap()
        .contains(&json!("authorization_code")));
    // Public clients: no secret is ever issued
    assert!(body.get("client_secret").is_none());
}

#[tokio::test]
async fn test_registration_accepts_loopback_and_custom_schemes() {
    let ctx = common::test_context();
    let app = common::test_app(&ctx);

    for uri in [
        "http://localhost/callback",
        "http://localhost:8234/callback",
        "http://127.0.0.1:9999/cb",
        "http://[::1]:7777/cb",
        "quarry://oauth/callback",
        "vscode://quarry.search/authorize",
    ] {
        let response = common::post_json(
            &app,
            "/oauth/register",
            json!({ "redirect_uris": [uri] }),
        )
        .await;
        assert_eq!(response.status(), 201, "expected {uri} to be accepted");
    }
}

#[tokio::test]
async fn test_registration_rejects_disallowed_schemes() {
    let ctx = common::test_context();
    let app = common::test_app(&ctx);

    for uri in [
        "ftp://client.example.com/callback",
        "http://client.example.com/callback",
        "javascript:alert(1)",
    ] {
        let response = common::post_json(
            &app,
            "/oauth/register",
            json!({ "redirect_uris": [uri] }),
        )
        .await;
        assert_eq!(response.status(), 400, "expected {uri} to be rejected");
        let body = common::body_json(response).await;
        assert_eq!(body["error"], "invalid_redirect_uri");
    }
}

#[tokio::test]
async fn test_registration_requires_redirect_uris() {
    let ctx = common::test_context();
    let app = common::test_app(&ctx);

    let response =
        common::post_json(&app, "/oauth/register", json!({ "redirect_uris": [] })).await;
    assert_eq!(response.status(), 400);
    let body = common::body_json(response).await;
    assert_eq!(body["error"], "invalid_redirect_uri");
}

#[tokio::test]
async fn test_registration_rejects_confidential_clients() {
    let ctx = common::test_context();
    let app = common::test_app(&ctx);

    let response = common::post_json(
        &app,
        "/oauth/register",
        json!({
            "redirect_uris": ["https://client.example.com/callback"],
            "token_endpoint_auth_method": "client_secret_basic",
        }),
    )
    .await;
    assert_eq!(response.status(), 400);
    let body = common::body_json(response).await;
    assert_eq!(body["error"], "invalid_client_metadata");
}

#[tokio::test]
async fn test_registration_requires_authorization_code_grant() {
    let ctx = common::test_context();
    let app = common::test_app(&ctx);

    let response = common::post_json(
        &app,
        "/oauth/register",
        json!({
            "redirect_uris": ["https://client.example.com/callback"],
            "grant_types": ["client_credentials"],
        }),
    )
    .await;
    assert_eq!(response.status(), 400);
    let body = common::body_json(response).await;
    assert_eq!(body["error"], "invalid_client_metadata");
}

#[tokio::test]
async fn test_registration_rejects_malformed_json() {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    let ctx = common::test_context();
    let app = common::test_app(&ctx);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/oauth/register")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body = common::body_json(response).await;
    assert_eq!(body["error"], "invalid_client_metadata");
}
