// ABOUTME: Upstream identity provider delegation
// ABOUTME: OIDC discovery plus the authorization-code-grant exchange driven on the provider
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quarry Search

/// Authorization URL building, code exchange, and userinfo fetching
pub mod client;
/// Provider discovery document fetching and caching
pub mod provider;

pub use client::{PkceParams, UpstreamClient, UpstreamTokens};
pub use provider::{DiscoveryDocument, ProviderDirectory};
