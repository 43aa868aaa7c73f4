// ABOUTME: Tests for the browser-facing authorization endpoint state machine
// ABOUTME: Covers validation, upstream login hand-off, consent, and the full callback flow
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quarry Search

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Duration;
use quarry_mcp_server::crypto::pkce;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use url::Url;

const REDIRECT_URI: &str = "http://localhost/callback";
const VERIFIER: &str = "client-verifier-client-verifier-client-verifier-client";

fn authorize_uri(client_id: &str, challenge: &str, extra: &str) -> String {
    format!(
        "/oauth/authorize?client_id={client_id}&redirect_uri={}&response_type=code&code_challenge={challenge}&code_challenge_method=S256&state=client-state&scope=search%3Aread{extra}",
        urlencoding::encode(REDIRECT_URI),
    )
}

fn location_url(response: &axum::http::Response<Body>) -> Url {
    let location = response
        .headers()
        .get("location")
        .expect("expected a redirect")
        .to_str()
        .unwrap();
    Url::parse(location).unwrap()
}

fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

#[tokio::test]
async fn test_unknown_client_renders_error_page() {
    let ctx = common::test_context();
    let app = common::test_app(&ctx);

    let challenge = pkce::challenge_s256(VERIFIER);
    let response = common::get(&app, &authorize_uri("mcp_unknown", &challenge, "")).await;

    assert_eq!(response.status(), 400);
    let body = common::body_string(response).await;
    assert!(body.contains("Unknown client"));
}

#[tokio::test]
async fn test_unregistered_redirect_uri_renders_error_page() {
    let ctx = common::test_context();
    let app = common::test_app(&ctx);
    let client_id = common::register_client(&app, REDIRECT_URI).await;

    let uri = format!(
        "/oauth/authorize?client_id={client_id}&redirect_uri={}&code_challenge={}",
        urlencoding::encode("http://localhost/evil"),
        pkce::challenge_s256(VERIFIER),
    );
    let response = common::get(&app, &uri).await;

    assert_eq!(response.status(), 400);
    let body = common::body_string(response).await;
    assert!(body.contains("Invalid redirect URI"));
}

#[tokio::test]
async fn test_missing_code_challenge_redirects_with_error_and_state() {
    let ctx = common::test_context();
    let app = common::test_app(&ctx);
    let client_id = common::register_client(&app, REDIRECT_URI).await;

    let uri = format!(
        "/oauth/authorize?client_id={client_id}&redirect_uri={}&state=client-state",
        urlencoding::encode(REDIRECT_URI),
    );
    let response = common::get(&app, &uri).await;

    assert_eq!(response.status(), 303);
    let url = location_url(&response);
    assert!(url.as_str().starts_with(REDIRECT_URI));
    assert_eq!(query_param(&url, "error").as_deref(), Some("invalid_request"));
    assert_eq!(query_param(&url, "state").as_deref(), Some("client-state"));
}

#[tokio::test]
async fn test_unsupported_response_type_redirects_with_error() {
    let ctx = common::test_context();
    let app = common::test_app(&ctx);
    let client_id = common::register_client(&app, REDIRECT_URI).await;

    let uri = format!(
        "/oauth/authorize?client_id={client_id}&redirect_uri={}&response_type=token&code_challenge={}&state=s1",
        urlencoding::encode(REDIRECT_URI),
        pkce::challenge_s256(VERIFIER),
    );
    let response = common::get(&app, &uri).await;

    let url = location_url(&response);
    assert_eq!(
        query_param(&url, "error").as_deref(),
        Some("unsupported_response_type")
    );
    assert_eq!(query_param(&url, "state").as_deref(), Some("s1"));
}

#[tokio::test]
async fn test_no_session_redirects_to_upstream_login() {
    let ctx = common::test_context();
    let app = common::test_app(&ctx);
    let client_id = common::register_client(&app, REDIRECT_URI).await;

    let challenge = pkce::challenge_s256(VERIFIER);
    let response = common::get(&app, &authorize_uri(&client_id, &challenge, "")).await;

    assert_eq!(response.status(), 303);
    let url = location_url(&response);
    assert!(url
        .as_str()
        .starts_with(&format!("{}/authorize", common::UPSTREAM_ISSUER)));
    // The upstream request carries its own PKCE challenge and nonce, plus the
    // signed state linking back to the original request
    assert!(query_param(&url, "code_challenge").is_some());
    assert_eq!(query_param(&url, "code_challenge_method").as_deref(), Some("S256"));
    assert!(query_param(&url, "nonce").is_some());
    assert!(query_param(&url, "state").is_some());
    assert_eq!(
        query_param(&url, "redirect_uri").as_deref(),
        Some(format!("{}/oauth/callback", common::PUBLIC_URL).as_str())
    );
}

#[tokio::test]
async fn test_session_without_consent_renders_consent_page() {
    let ctx = common::test_context();
    let app = common::test_app(&ctx);
    let client_id = common::register_client(&app, REDIRECT_URI).await;
    let (_, cookie) = common::seed_session(&ctx, &common::test_claims()).await;

    let challenge = pkce::challenge_s256(VERIFIER);
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(authorize_uri(&client_id, &challenge, ""))
                .header("cookie", &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body = common::body_string(response).await;
    assert!(body.contains("Test Search Client"));
    assert!(body.contains("consent_state"));
    assert!(body.contains("search:read"));
}

#[tokio::test]
async fn test_consent_deny_redirects_access_denied() {
    let ctx = common::test_context();
    let app = common::test_app(&ctx);
    let client_id = common::register_client(&app, REDIRECT_URI).await;
    let (_, cookie) = common::seed_session(&ctx, &common::test_claims()).await;

    let consent_state = ctx
        .state_signer
        .sign(
            &json!({ "request": {
                "client_id": client_id,
                "redirect_uri": REDIRECT_URI,
                "state": "client-state",
                "code_challenge": pkce::challenge_s256(VERIFIER),
            }}),
            Duration::minutes(10),
        )
        .unwrap();

    let body =
        serde_urlencoded::to_string([("decision", "deny"), ("consent_state", consent_state.as_str())])
            .unwrap();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/oauth/consent")
                .header("content-type", "application/x-www-form-urlencoded")
                .header("cookie", &cookie)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    let url = location_url(&response);
    assert_eq!(query_param(&url, "error").as_deref(), Some("access_denied"));
    assert_eq!(query_param(&url, "state").as_deref(), Some("client-state"));
}

#[tokio::test]
async fn test_consent_approve_issues_code_and_remembers_client() {
    let ctx = common::test_context();
    let app = common::test_app(&ctx);
    let client_id = common::register_client(&app, REDIRECT_URI).await;
    let (_, cookie) = common::seed_session(&ctx, &common::test_claims()).await;

    let consent_state = ctx
        .state_signer
        .sign(
            &json!({ "request": {
                "client_id": client_id,
                "redirect_uri": REDIRECT_URI,
                "state": "client-state",
                "code_challenge": pkce::challenge_s256(VERIFIER),
                "code_challenge_method": "S256",
            }}),
            Duration::minutes(10),
        )
        .unwrap();

    let body =
        serde_urlencoded::to_string([("decision", "approve"), ("consent_state", consent_state.as_str())])
            .unwrap();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/oauth/consent")
                .header("content-type", "application/x-www-form-urlencoded")
                .header("cookie", &cookie)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    let url = location_url(&response);
    assert!(query_param(&url, "code").is_some());
    assert_eq!(query_param(&url, "state").as_deref(), Some("client-state"));

    // The approval is remembered in a signed cookie
    let set_cookie = response
        .headers()
        .get_all("set-cookie")
        .iter()
        .map(|v| v.to_str().unwrap().to_owned())
        .collect::<Vec<_>>();
    assert!(set_cookie
        .iter()
        .any(|c| c.starts_with("quarry_approved_clients=") && c.contains("HttpOnly")));
}

#[tokio::test]
async fn test_approved_client_skips_consent() {
    let ctx = common::test_context();
    let app = common::test_app(&ctx);
    let client_id = common::register_client(&app, REDIRECT_URI).await;
    let (_, session_cookie) = common::seed_session(&ctx, &common::test_claims()).await;

    let approved = ctx
        .state_signer
        .sign(&json!({ "client_ids": [client_id] }), Duration::days(90))
        .unwrap();
    let cookie = format!("{session_cookie}; quarry_approved_clients={approved}");

    let challenge = pkce::challenge_s256(VERIFIER);
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(authorize_uri(&client_id, &challenge, ""))
                .header("cookie", &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), 303);
    let url = location_url(&response);
    assert!(url.as_str().starts_with(REDIRECT_URI));
    assert!(query_param(&url, "code").is_some());
}

#[tokio::test]
async fn test_session_missing_required_claim_restarts_login() {
    let ctx = common::test_context();
    let app = common::test_app(&ctx);
    let client_id = common::register_client(&app, REDIRECT_URI).await;

    // Session predates the deployment requiring an email claim
    let claims = serde_json::from_value(json!({ "sub": "user-1" })).unwrap();
    let (session, cookie) = common::seed_session(&ctx, &claims).await;

    let challenge = pkce::challenge_s256(VERIFIER);
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(authorize_uri(&client_id, &challenge, ""))
                .header("cookie", &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Back through the upstream login, and the stale session is gone
    let url = location_url(&response);
    assert!(url
        .as_str()
        .starts_with(&format!("{}/authorize", common::UPSTREAM_ISSUER)));
    assert!(ctx
        .store
        .get_session(&session.session_id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_callback_with_invalid_state_renders_error_page() {
    let ctx = common::test_context();
    let app = common::test_app(&ctx);

    let response = common::get(&app, "/oauth/callback?code=abc&state=bogus.state").await;
    assert_eq!(response.status(), 400);
    let body = common::body_string(response).await;
    assert!(body.contains("Invalid state"));
}

/// Mock upstream IdP: a token endpoint that returns an ID token carrying
/// whatever nonce the test observed in the authorization redirect, plus a
/// userinfo endpoint
async fn spawn_mock_idp(nonce_slot: Arc<Mutex<Option<String>>>) -> String {
    fn b64(value: &Value) -> String {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
        URL_SAFE_NO_PAD.encode(value.to_string())
    }

    async fn token_handler(State(nonce): State<Arc<Mutex<Option<String>>>>) -> Json<Value> {
        let nonce = nonce.lock().unwrap().clone().unwrap_or_default();
        let header = b64(&json!({ "alg": "RS256", "typ": "JWT" }));
        let payload = b64(&json!({
            "sub": "user-1",
            "email": "user@example.com",
            "nonce": nonce,
        }));
        let id_token = format!("{header}.{payload}.c2ln");
        Json(json!({
            "access_token": "upstream-access-token",
            "token_type": "Bearer",
            "refresh_token": "upstream-refresh-token",
            "id_token": id_token,
        }))
    }

    async fn userinfo_handler() -> Json<Value> {
        Json(json!({
            "sub": "user-1",
            "email": "user@example.com",
            "name": "Test User",
        }))
    }

    let router = Router::new()
        .route("/token", post(token_handler))
        .route("/userinfo", get(userinfo_handler))
        .with_state(nonce_slot);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn extract_hidden_field(html: &str, name: &str) -> String {
    let marker = format!("name=\"{name}\" value=\"");
    let start = html.find(&marker).unwrap() + marker.len();
    let end = html[start..].find('"').unwrap();
    html[start..start + end].to_owned()
}

#[tokio::test]
async fn test_full_login_callback_consent_and_exchange() {
    let nonce_slot = Arc::new(Mutex::new(None));
    let idp_base = spawn_mock_idp(Arc::clone(&nonce_slot)).await;

    let ctx = common::test_context_with(
        common::test_config(),
        common::test_discovery(
            &format!("{idp_base}/token"),
            Some(&format!("{idp_base}/userinfo")),
        ),
    );
    let app = common::test_app(&ctx);
    let client_id = common::register_client(&app, REDIRECT_URI).await;

    // Step 1: no session, so the browser is sent upstream
    let challenge = pkce::challenge_s256(VERIFIER);
    let response = common::get(&app, &authorize_uri(&client_id, &challenge, "")).await;
    let upstream_url = location_url(&response);
    let login_state = query_param(&upstream_url, "state").unwrap();
    let nonce = query_param(&upstream_url, "nonce").unwrap();
    *nonce_slot.lock().unwrap() = Some(nonce);

    // Step 2: the IdP redirects back; the server exchanges the code and
    // establishes a session, then asks for consent
    let callback_uri = format!(
        "/oauth/callback?code=upstream-code&state={}",
        urlencoding::encode(&login_state)
    );
    let response = common::get(&app, &callback_uri).await;
    assert_eq!(response.status(), 200);

    let session_cookie = response
        .headers()
        .get_all("set-cookie")
        .iter()
        .find_map(|v| {
            let value = v.to_str().ok()?;
            value
                .starts_with("quarry_session=")
                .then(|| value.split(';').next().unwrap().to_owned())
        })
        .expect("expected a session cookie");

    let consent_html = common::body_string(response).await;
    let consent_state = extract_hidden_field(&consent_html, "consent_state");

    // Step 3: approve
    let body =
        serde_urlencoded::to_string([("decision", "approve"), ("consent_state", consent_state.as_str())])
            .unwrap();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/oauth/consent")
                .header("content-type", "application/x-www-form-urlencoded")
                .header("cookie", &session_cookie)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    let url = location_url(&response);
    assert!(url.as_str().starts_with(REDIRECT_URI));
    assert_eq!(query_param(&url, "state").as_deref(), Some("client-state"));
    let code = query_param(&url, "code").unwrap();

    // Step 4: the client exchanges the code for tokens
    let response = common::post_json(
        &app,
        "/oauth/token",
        json!({
            "grant_type": "authorization_code",
            "client_id": client_id,
            "code": code,
            "redirect_uri": REDIRECT_URI,
            "code_verifier": VERIFIER,
        }),
    )
    .await;
    assert_eq!(response.status(), 200);
    let tokens = common::body_json(response).await;
    assert!(tokens["access_token"].as_str().is_some());
    assert!(tokens["refresh_token"].as_str().is_some());

    // Replaying the upstream callback must fail: the transaction is consumed
    let replay = common::get(&app, &callback_uri).await;
    let url = location_url(&replay);
    assert_eq!(query_param(&url, "error").as_deref(), Some("invalid_request"));
}
