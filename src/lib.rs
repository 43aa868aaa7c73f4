// ABOUTME: Main library entry point for the Quarry code-search API platform
// ABOUTME: Delegated OAuth 2.0 authorization server protecting an MCP tool-calling endpoint
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quarry Search

#![deny(unsafe_code)]

//! # Quarry MCP Server
//!
//! A code-search backend exposed through the Model Context Protocol, protected
//! by a delegated OAuth 2.0 authorization server. This crate owns the
//! authorization core: dynamic client registration, browser login delegated to
//! an upstream OpenID Connect provider, consent tracking, PKCE-bound
//! authorization codes, and access/refresh token issuance with safe rotation.
//!
//! ## Architecture
//!
//! - **crypto**: signed state blobs, PKCE verification, at-rest sealing
//! - **storage**: pluggable auth store (in-memory or Redis) behind one trait
//! - **upstream**: OIDC discovery plus the authorization-code grant against
//!   the upstream provider
//! - **`oauth2_server`**: registration, authorization, consent, and token
//!   endpoints
//! - **middleware**: bearer validation publishing claims into request
//!   extensions
//! - **mcp**: the protected tool-calling surface
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use quarry_mcp_server::config::ServerConfig;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::from_env()?;
//!     println!("Quarry configured: {}", config.summary());
//!     Ok(())
//! }
//! ```

/// Access token minting and validation
pub mod auth;

/// Environment-based configuration
pub mod config;

/// Shared server context and per-request authenticated identity
pub mod context;

/// Cryptographic primitives: signed state, PKCE, sealing, randomness
pub mod crypto;

/// Unified error handling
pub mod errors;

/// Structured logging setup
pub mod logging;

/// Protected MCP endpoint surface
pub mod mcp;

/// Bearer authentication middleware
pub mod middleware;

/// Persistent record types
pub mod models;

/// OAuth 2.0 authorization server endpoints
pub mod oauth2_server;

/// Top-level router composition
pub mod routes;

/// Storage abstraction and backends
pub mod storage;

/// Upstream identity provider delegation
pub mod upstream;
