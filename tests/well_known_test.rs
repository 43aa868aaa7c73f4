// ABOUTME: Tests for the public discovery documents
// ABOUTME: Metadata shape and the CORS policy that applies only to well-known endpoints
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quarry Search

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use axum::body::Body;
use axum::http::Request;
use serde_json::json;
use tower::ServiceExt;

async fn get_with_origin(app: &axum::Router, uri: &str) -> axum::http::Response<Body> {
    app.clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .header("origin", "https://client.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_authorization_server_metadata() {
    let ctx = common::test_context();
    let app = common::test_app(&ctx);

    let response = get_with_origin(&app, "/.well-known/oauth-authorization-server").await;
    assert_eq!(response.status(), 200);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "*"
    );

    let body = common::body_json(response).await;
    assert_eq!(body["issuer"], common::PUBLIC_URL);
    assert_eq!(
        body["authorization_endpoint"],
        format!("{}/oauth/authorize", common::PUBLIC_URL)
    );
    assert_eq!(
        body["token_endpoint"],
        format!("{}/oauth/token", common::PUBLIC_URL)
    );
    assert_eq!(
        body["registration_endpoint"],
        format!("{}/oauth/register", common::PUBLIC_URL)
    );
    assert_eq!(body["token_endpoint_auth_methods_supported"], json!(["none"]));
    assert!(body["code_challenge_methods_supported"]
        .as_array()
        .unwrap()
        .contains(&json!("S256")));
    assert!(body["grant_types_supported"]
        .as_array()
        .unwrap()
        .contains(&json!("refresh_token")));
}

#[tokio::test]
async fn test_protected_resource_metadata() {
    let ctx = common::test_context();
    let app = common::test_app(&ctx);

    for uri in [
        "/.well-known/oauth-protected-resource",
        "/.well-known/oauth-protected-resource/mcp",
    ] {
        let response = get_with_origin(&app, uri).await;
        assert_eq!(response.status(), 200);
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .unwrap(),
            "*"
        );

        let body = common::body_json(response).await;
        assert_eq!(body["resource"], format!("{}/mcp", common::PUBLIC_URL));
        assert_eq!(body["authorization_servers"], json!([common::PUBLIC_URL]));
        assert_eq!(body["bearer_methods_supported"], json!(["header"]));
    }
}

#[tokio::test]
async fn test_well_known_preflight_is_allowed() {
    let ctx = common::test_context();
    let app = common::test_app(&ctx);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/.well-known/oauth-authorization-server")
                .header("origin", "https://client.example.com")
                .header("access-control-request-method", "GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_success());
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "*"
    );
}

#[tokio::test]
async fn test_oauth_endpoints_do_not_reflect_cors() {
    let ctx = common::test_context();
    let app = common::test_app(&ctx);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/oauth/register")
                .header("origin", "https://client.example.com")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({ "redirect_uris": ["https://client.example.com/cb"] }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), 201);
    assert!(response
        .headers()
        .get("access-control-allow-origin")
        .is_none());
}

#[tokio::test]
async fn test_health_endpoint() {
    let ctx = common::test_context();
    let app = common::test_app(&ctx);

    let response = common::get(&app, "/health").await;
    assert_eq!(response.status(), 200);
    let body = common::body_json(response).await;
    assert_eq!(body["status"], "healthy");
}
