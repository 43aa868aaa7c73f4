// ABOUTME: Configuration module for environment-based server configuration
// ABOUTME: Re-exports the environment configuration types used across the server
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quarry Search

/// Environment-based server configuration
pub mod environment;

pub use environment::{ServerConfig, StorageBackend, StorageConfig, UpstreamConfig};
