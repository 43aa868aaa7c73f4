// ABOUTME: Top-level router composition for the Quarry server
// ABOUTME: Health, OAuth/discovery, and the bearer-protected MCP surface
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quarry Search

use crate::context::ServerContext;
use crate::{mcp, oauth2_server};
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Build the complete application router
pub fn build_router(ctx: Arc<ServerContext>) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(oauth2_server::routes::router(Arc::clone(&ctx)))
        .merge(mcp::routes::router(ctx))
        .layer(TraceLayer::new_for_http())
}

/// Unauthenticated health probe for load balancers
fn health_routes() -> Router {
    async fn health_handler() -> Json<serde_json::Value> {
        Json(serde_json::json!({
            "status": "healthy",
            "timestamp": chrono::Utc::now().to_rfc3339()
        }))
    }

    Router::new().route("/health", get(health_handler))
}
