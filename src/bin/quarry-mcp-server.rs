// ABOUTME: Server binary for the Quarry code-search API
// ABOUTME: Loads configuration, wires the storage backend, and serves the axum router
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quarry Search

//! # Quarry MCP Server Binary
//!
//! Starts the OAuth 2.0 protected MCP backend: configuration comes from the
//! environment, durable state from the configured storage backend, and the
//! HTTP surface from the shared router.

use anyhow::Result;
use clap::Parser;
use quarry_mcp_server::{
    config::ServerConfig, context::ServerContext, logging, routes::build_router,
    storage::factory::auth_store_from_config,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser)]
#[command(name = "quarry-mcp-server")]
#[command(about = "Quarry code search API - OAuth 2.0 protected MCP backend")]
struct Args {
    /// Override HTTP port
    #[arg(long)]
    http_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ServerConfig::from_env()?;
    if let Some(http_port) = args.http_port {
        config.http_port = http_port;
    }

    logging::init_from_env()?;

    info!("Starting Quarry MCP Server");
    info!("{}", config.summary());

    let store = auth_store_from_config(&config.storage).await?;
    let http_port = config.http_port;
    let ctx = Arc::new(ServerContext::new(config, store)?);
    let router = build_router(ctx);

    let listener = TcpListener::bind(("0.0.0.0", http_port)).await?;
    info!("Listening on port {http_port}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install shutdown signal handler: {e}");
    }
}
