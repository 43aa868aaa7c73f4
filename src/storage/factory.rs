// ABOUTME: Storage factory for configuration-based backend selection
// ABOUTME: Builds the in-memory or Redis auth store behind the shared trait object
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quarry Search

use super::{memory::MemoryAuthStore, redis::RedisAuthStore, AuthStore};
use crate::config::{StorageBackend, StorageConfig};
use crate::errors::{AppError, AppResult};
use std::sync::Arc;
use tracing::info;

/// Build the configured storage backend
///
/// # Errors
///
/// Returns an error if the Redis backend is selected without a connection
/// string or if the connection fails
pub async fn auth_store_from_config(config: &StorageConfig) -> AppResult<Arc<dyn AuthStore>> {
    match config.backend {
        StorageBackend::Memory => {
            info!("Initializing in-memory auth store (single instance)");
            Ok(Arc::new(MemoryAuthStore::new()))
        }
        StorageBackend::Redis => {
            let redis_url = config
                .redis_url
                .as_deref()
                .ok_or_else(|| AppError::config("Redis URL is required for the redis backend"))?;
            info!("Initializing Redis auth store");
            Ok(Arc::new(RedisAuthStore::connect(redis_url).await?))
        }
    }
}
