// ABOUTME: Bearer authentication middleware for the protected MCP endpoint
// ABOUTME: Validates access tokens and injects verified claims into request extensions
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quarry Search

use crate::auth::JwtValidationError;
use crate::context::{AuthenticatedUser, ServerContext};
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

/// Validate the bearer token on every protected request
///
/// On success the verified claims are published as an [`AuthenticatedUser`]
/// request extension, so downstream handlers read identity without
/// re-validating or threading parameters.
pub async fn bearer_auth_middleware(
    State(ctx): State<Arc<ServerContext>>,
    mut req: Request,
    next: Next,
) -> Response {
    let token = match bearer_token(&req) {
        Some(token) => token,
        None => {
            debug!("request to protected endpoint without bearer token");
            return challenge_response(&ctx, StatusCode::UNAUTHORIZED, None, None);
        }
    };

    let claims = match ctx.token_manager.validate_access_token(token) {
        Ok(claims) => claims,
        Err(e) => {
            warn!("bearer token rejected: {e}");
            let description = match e {
                JwtValidationError::TokenExpired => "The access token has expired",
                JwtValidationError::TokenInvalid { .. } => "The access token is invalid",
                JwtValidationError::TokenMalformed { .. } => "The access token is malformed",
            };
            return challenge_response(
                &ctx,
                StatusCode::UNAUTHORIZED,
                Some("invalid_token"),
                Some(description),
            );
        }
    };

    // Required claims are checked at issuance time too; this guards tokens
    // minted before the deployment tightened its requirements.
    if let Some(missing) = claims.missing_required(&ctx.config.required_claims) {
        warn!(claim = missing, sub = %claims.sub, "token is missing a required claim");
        return challenge_response(
            &ctx,
            StatusCode::FORBIDDEN,
            Some("insufficient_scope"),
            Some("The access token is missing a required claim"),
        );
    }

    req.extensions_mut().insert(AuthenticatedUser { claims });
    next.run(req).await
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Standards-shaped challenge so compliant clients can recover automatically
fn challenge_response(
    ctx: &ServerContext,
    status: StatusCode,
    error: Option<&str>,
    description: Option<&str>,
) -> Response {
    let resource_metadata = format!(
        "{}/.well-known/oauth-protected-resource",
        ctx.config.public_url
    );

    let mut challenge = format!("Bearer resource_metadata=\"{resource_metadata}\"");
    if let Some(error) = error {
        challenge.push_str(&format!(", error=\"{error}\""));
    }
    if let Some(description) = description {
        challenge.push_str(&format!(", error_description=\"{description}\""));
    }

    let body = Json(json!({
        "error": error.unwrap_or("unauthorized"),
        "error_description": description.unwrap_or("Authorization required"),
    }));

    let mut response = (status, body).into_response();
    if let Ok(value) = HeaderValue::from_str(&challenge) {
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, value);
    }
    response
}
