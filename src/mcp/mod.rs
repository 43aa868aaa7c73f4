// ABOUTME: Protected MCP surface guarded by the bearer middleware
// ABOUTME: The tool-calling dispatcher itself is an external collaborator
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quarry Search

/// HTTP routes for the protected endpoint and the debug endpoint
pub mod routes;
