//! Background cache population with bounded retry.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backon::Retryable;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use super::RoundCache;
use crate::model::Round;
use crate::utils::retry::populate_backoff;

/// How a population task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopulateOutcome {
    Stored { attempts: usize },
    /// The cache already held a later version of the same round.
    Superseded { cached_version: u64 },
    GaveUp { attempts: usize },
    Cancelled,
}

/// Completion handle for a population task.
#[derive(Debug)]
pub struct PopulateTicket {
    done: oneshot::Receiver<PopulateOutcome>,
}

impl PopulateTicket {
    /// Wait for the task to finish.
    pub async fn wait(self) -> PopulateOutcome {
        self.done.await.unwrap_or(PopulateOutcome::Cancelled)
    }
}

/// Writes rounds into a cache from tracked background tasks.
///
/// Each task makes up to `attempts` writes with a fixed `delay` in between.
/// Failures are logged, never returned to the caller that triggered
/// population. A write is skipped when the cache already holds a later
/// version of the same round. That check and the write are not atomic, so
/// an entry can still be left stale until the next mutation or its TTL.
#[derive(Clone)]
pub struct CachePopulator {
    cache: Arc<dyn RoundCache>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    attempts: usize,
    delay: Duration,
    ttl: Duration,
}

impl CachePopulator {
    pub fn new(cache: Arc<dyn RoundCache>, attempts: usize, delay: Duration, ttl: Duration) -> Self {
        Self {
            cache,
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
            attempts: attempts.max(1),
            delay,
            ttl,
        }
    }

    pub fn cache(&self) -> &Arc<dyn RoundCache> {
        &self.cache
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store `round` under `group_id` in the background.
    pub fn populate(&self, group_id: impl Into<String>, round: Round) -> PopulateTicket {
        let (tx, rx) = oneshot::channel();
        let group_id = group_id.into();
        let cache = self.cache.clone();
        let cancel = self.cancel.clone();
        let (attempts, delay, ttl) = (self.attempts, self.delay, self.ttl);

        self.tracker.spawn(async move {
            let outcome = populate_with_retry(
                cache.as_ref(),
                &cancel,
                &group_id,
                &round,
                attempts,
                delay,
                ttl,
            )
            .await;
            let _ = tx.send(outcome);
        });

        PopulateTicket { done: rx }
    }

    /// Cancel pending population and wait for every task to exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

async fn populate_with_retry(
    cache: &dyn RoundCache,
    cancel: &CancellationToken,
    group_id: &str,
    round: &Round,
    attempts: usize,
    delay: Duration,
    ttl: Duration,
) -> PopulateOutcome {
    let counter = AtomicUsize::new(0);
    let tried = &counter;

    let write = (move || async move {
        let attempt = tried.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(cached_version) = newer_entry(cache, group_id, round).await {
            debug!(
                %group_id,
                cached_version,
                version = round.version,
                "Cache already holds a newer round"
            );
            return Ok(Some(cached_version));
        }
        match cache.set(group_id, round, ttl).await {
            Ok(()) => {
                debug!(%group_id, attempt, "Cached current round");
                Ok(None)
            }
            Err(e) => {
                warn!(%group_id, attempt, attempts, error = %e, "Cache population failed");
                Err(e)
            }
        }
    })
    .retry(populate_backoff(delay, attempts));

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => return PopulateOutcome::Cancelled,
        result = write => result,
    };

    let attempts = counter.load(Ordering::SeqCst);
    match result {
        Ok(None) => PopulateOutcome::Stored { attempts },
        Ok(Some(cached_version)) => PopulateOutcome::Superseded { cached_version },
        Err(_) => {
            warn!(%group_id, attempts, "Giving up on cache population");
            PopulateOutcome::GaveUp { attempts }
        }
    }
}

/// Version of the cached round for `group_id` when it is newer than `round`.
///
/// An unreadable cache counts as empty.
async fn newer_entry(cache: &dyn RoundCache, group_id: &str, round: &Round) -> Option<u64> {
    match cache.get(group_id).await {
        Ok(Some(cached)) if cached.id == round.id && cached.version > round.version => {
            Some(cached.version)
        }
        _ => None,
    }
}
