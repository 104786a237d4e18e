//! In-process round cache.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use super::{Result, RoundCache};
use crate::model::Round;

struct Entry {
    round: Round,
    expires_at: Instant,
}

/// DashMap-backed cache. Expired entries are evicted when read.
#[derive(Default)]
pub struct MemoryRoundCache {
    entries: DashMap<String, Entry>,
}

impl MemoryRoundCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl RoundCache for MemoryRoundCache {
    async fn get(&self, group_id: &str) -> Result<Option<Round>> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(group_id) {
            if entry.expires_at > now {
                return Ok(Some(entry.round.clone()));
            }
        }
        self.entries
            .remove_if(group_id, |_, entry| entry.expires_at <= now);
        Ok(None)
    }

    async fn set(&self, group_id: &str, round: &Round, ttl: Duration) -> Result<()> {
        self.entries.insert(
            group_id.to_string(),
            Entry {
                round: round.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn remove(&self, group_id: &str) -> Result<()> {
        self.entries.remove(group_id);
        Ok(())
    }
}
