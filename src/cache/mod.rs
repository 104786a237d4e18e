//! Read-through cache for the current round of each study.
//!
//! Entries are keyed by group id and expire after a TTL. The cache is never
//! authoritative: readers that need the latest state go to the store.
//!
//! This module contains:
//! - `RoundCache` trait
//! - `CachePopulator`: bounded-retry background population
//! - Implementations: in-memory (DashMap), Redis

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{error, info};

use crate::model::Round;

pub mod memory;
mod populate;
#[cfg(feature = "redis")]
pub mod redis;

pub use memory::MemoryRoundCache;
pub use populate::{CachePopulator, PopulateOutcome, PopulateTicket};
#[cfg(feature = "redis")]
pub use self::redis::RedisRoundCache;

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors that can occur during cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown cache type: {0}")]
    UnknownBackend(String),
}

/// Key/value cache of rounds with per-entry expiry.
#[async_trait]
pub trait RoundCache: Send + Sync {
    /// Cached round for `group_id`, if present and not expired.
    async fn get(&self, group_id: &str) -> Result<Option<Round>>;

    /// Store `round` under `group_id` for `ttl`.
    async fn set(&self, group_id: &str, round: &Round, ttl: Duration) -> Result<()>;

    async fn remove(&self, group_id: &str) -> Result<()>;
}

/// Cache configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache type: "memory" or "redis".
    #[serde(rename = "type")]
    pub cache_type: String,
    /// Redis connection URL.
    pub url: String,
    /// Prefix for every Redis key.
    pub key_prefix: String,
    /// Entry lifetime in seconds.
    pub ttl_secs: u64,
    /// Population attempts before giving up.
    pub populate_attempts: usize,
    /// Delay between population attempts, in milliseconds.
    pub populate_delay_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_type: "memory".to_string(),
            url: "redis://localhost:6379".to_string(),
            key_prefix: "study".to_string(),
            ttl_secs: 300,
            populate_attempts: 3,
            populate_delay_ms: 1000,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn populate_delay(&self) -> Duration {
        Duration::from_millis(self.populate_delay_ms)
    }
}

/// Initialize the round cache based on configuration.
pub async fn init_cache(config: &CacheConfig) -> Result<Arc<dyn RoundCache>> {
    info!(cache_type = %config.cache_type, "Initializing cache");

    match config.cache_type.as_str() {
        "memory" => Ok(Arc::new(MemoryRoundCache::new())),
        #[cfg(feature = "redis")]
        "redis" => {
            let cache = RedisRoundCache::new(&config.url, Some(&config.key_prefix)).await?;
            Ok(Arc::new(cache))
        }
        #[cfg(not(feature = "redis"))]
        "redis" => {
            error!("Redis cache requested but 'redis' feature is not enabled");
            Err(CacheError::UnknownBackend("redis".to_string()))
        }
        other => {
            error!(cache_type = %other, "Unknown cache type");
            Err(CacheError::UnknownBackend(other.to_string()))
        }
    }
}
