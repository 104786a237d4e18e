//! Redis round cache.
//!
//! Rounds are stored as JSON strings with a millisecond expiry, so Redis
//! evicts them on its own.

use std::time::Duration;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use tracing::info;

use super::{Result, RoundCache};
use crate::model::Round;

/// Redis-backed round cache.
pub struct RedisRoundCache {
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisRoundCache {
    /// Connect to Redis.
    ///
    /// # Arguments
    /// * `url` - Redis connection URL (e.g., redis://localhost:6379)
    /// * `key_prefix` - Prefix for all keys (default: "study")
    pub async fn new(url: &str, key_prefix: Option<&str>) -> Result<Self> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;

        info!(url = %url, "Connected to Redis");

        Ok(Self {
            conn,
            key_prefix: key_prefix.unwrap_or("study").to_string(),
        })
    }

    fn round_key(&self, group_id: &str) -> String {
        format!("{}:round:{}", self.key_prefix, group_id)
    }
}

#[async_trait]
impl RoundCache for RedisRoundCache {
    async fn get(&self, group_id: &str) -> Result<Option<Round>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(self.round_key(group_id)).await?;
        match value {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, group_id: &str, round: &Round, ttl: Duration) -> Result<()> {
        let json = serde_json::to_string(round)?;
        let millis = ttl.as_millis().max(1) as u64;
        let mut conn = self.conn.clone();
        let _: () = conn.pset_ex(self.round_key(group_id), json, millis).await?;
        Ok(())
    }

    async fn remove(&self, group_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(self.round_key(group_id)).await?;
        Ok(())
    }
}
