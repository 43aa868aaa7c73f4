// ABOUTME: Environment-based configuration for the Quarry authorization server
// ABOUTME: Loads, validates, and summarizes all deployment settings from env vars
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quarry Search

use anyhow::{anyhow, Context, Result};
use std::env;
use url::Url;

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// Single-process in-memory store (development, tests)
    Memory,
    /// Shared Redis store for multi-instance deployments
    Redis,
}

impl StorageBackend {
    /// Parse a backend name, falling back to `Memory`
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Self::Redis,
            _ => Self::Memory,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Selected backend
    pub backend: StorageBackend,
    /// Redis connection string, required when the backend is `Redis`
    pub redis_url: Option<String>,
}

/// Upstream identity provider configuration
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Issuer URL used for OIDC discovery
    pub issuer: String,
    /// Client id registered with the upstream provider
    pub client_id: String,
    /// Client secret registered with the upstream provider
    pub client_secret: String,
    /// Scopes requested on upstream login
    pub scopes: Vec<String>,
}

/// Complete server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listen port
    pub http_port: u16,
    /// Public base URL of this server (issuer for minted tokens)
    pub public_url: String,
    /// Secret used to sign access tokens and derive the refresh-token lookup key
    pub token_secret: String,
    /// Secret used to sign cookies and redirect state blobs
    pub cookie_secret: String,
    /// Upstream identity provider settings
    pub upstream: UpstreamConfig,
    /// Claims that must be present on every authenticated identity
    pub required_claims: Vec<String>,
    /// Custom (non-HTTP) redirect-URI schemes accepted at client registration
    pub allowed_custom_schemes: Vec<String>,
    /// Storage backend settings
    pub storage: StorageConfig,
    /// Access token lifetime in seconds
    pub access_token_ttl_secs: i64,
    /// Refresh token lifetime in days
    pub refresh_token_ttl_days: i64,
    /// Browser session lifetime in days
    pub session_ttl_days: i64,
    /// Whether the bearer-protected debug endpoint is mounted
    pub debug_endpoint: bool,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value fails to parse
    pub fn from_env() -> Result<Self> {
        let config = Self {
            http_port: env_or("HTTP_PORT", "8080")
                .parse()
                .context("invalid HTTP_PORT")?,
            public_url: trim_trailing_slash(&env_required("QUARRY_PUBLIC_URL")?),
            token_secret: env_required("QUARRY_TOKEN_SECRET")?,
            cookie_secret: env_required("QUARRY_COOKIE_SECRET")?,
            upstream: UpstreamConfig {
                issuer: trim_trailing_slash(&env_required("QUARRY_UPSTREAM_ISSUER")?),
                client_id: env_required("QUARRY_UPSTREAM_CLIENT_ID")?,
                client_secret: env_required("QUARRY_UPSTREAM_CLIENT_SECRET")?,
                scopes: split_list(&env_or("QUARRY_UPSTREAM_SCOPES", "openid email profile")),
            },
            required_claims: split_list(&env_or("QUARRY_REQUIRED_CLAIMS", "sub email")),
            allowed_custom_schemes: split_list(&env_or(
                "QUARRY_CUSTOM_SCHEMES",
                "quarry vscode cursor",
            )),
            storage: StorageConfig {
                backend: StorageBackend::from_str_or_default(&env_or(
                    "QUARRY_STORAGE_BACKEND",
                    "memory",
                )),
                redis_url: env::var("REDIS_URL").ok(),
            },
            access_token_ttl_secs: env_or("QUARRY_ACCESS_TOKEN_TTL_SECS", "3600")
                .parse()
                .context("invalid QUARRY_ACCESS_TOKEN_TTL_SECS")?,
            refresh_token_ttl_days: env_or("QUARRY_REFRESH_TOKEN_TTL_DAYS", "30")
                .parse()
                .context("invalid QUARRY_REFRESH_TOKEN_TTL_DAYS")?,
            session_ttl_days: env_or("QUARRY_SESSION_TTL_DAYS", "30")
                .parse()
                .context("invalid QUARRY_SESSION_TTL_DAYS")?,
            debug_endpoint: env_or("QUARRY_DEBUG_ENDPOINT", "false") == "true",
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field consistency
    ///
    /// # Errors
    ///
    /// Returns an error when a setting is malformed or a dependent setting is missing
    pub fn validate(&self) -> Result<()> {
        let public = Url::parse(&self.public_url).context("QUARRY_PUBLIC_URL is not a URL")?;
        if public.scheme() != "http" && public.scheme() != "https" {
            return Err(anyhow!("QUARRY_PUBLIC_URL must be http or https"));
        }
        Url::parse(&self.upstream.issuer).context("QUARRY_UPSTREAM_ISSUER is not a URL")?;

        if self.token_secret.len() < 32 {
            return Err(anyhow!("QUARRY_TOKEN_SECRET must be at least 32 bytes"));
        }
        if self.cookie_secret.len() < 32 {
            return Err(anyhow!("QUARRY_COOKIE_SECRET must be at least 32 bytes"));
        }
        if self.storage.backend == StorageBackend::Redis && self.storage.redis_url.is_none() {
            return Err(anyhow!("REDIS_URL is required for the redis storage backend"));
        }
        if self.access_token_ttl_secs <= 0 {
            return Err(anyhow!("QUARRY_ACCESS_TOKEN_TTL_SECS must be positive"));
        }
        Ok(())
    }

    /// Whether cookies should carry the `Secure` attribute
    #[must_use]
    pub fn secure_cookies(&self) -> bool {
        self.public_url.starts_with("https://")
    }

    /// Human-readable startup summary; never includes secrets
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "public_url={} port={} storage={:?} upstream_issuer={} required_claims=[{}] debug_endpoint={}",
            self.public_url,
            self.http_port,
            self.storage.backend,
            self.upstream.issuer,
            self.required_claims.join(","),
            self.debug_endpoint,
        )
    }
}

fn env_required(key: &str) -> Result<String> {
    env::var(key).map_err(|_| anyhow!("missing required environment variable {key}"))
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split([' ', ','])
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

fn trim_trailing_slash(value: &str) -> String {
    value.trim_end_matches('/').to_owned()
}
