// ABOUTME: Tower middleware for the protected MCP surface
// ABOUTME: Bearer token validation and per-request claim propagation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quarry Search

/// Bearer authentication middleware
pub mod auth;

pub use auth::bearer_auth_middleware;
