//! Service façade: the only entry point for collaborators.
//!
//! Every mutating operation follows the same sequence:
//! 1. take the per-study lock
//! 2. run a pure unit of work through the [`TransactionExecutor`]
//! 3. refresh the round cache with what was committed
//! 4. release the lock
//! 5. publish the resulting event from a tracked background task
//!
//! Publication failures are logged and never turn a committed operation
//! into an error.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::Instant;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

use crate::bus::{EventBus, PublishConfig, ReliablePublisher, StudyEvent};
use crate::cache::{CacheConfig, CachePopulator, RoundCache};
use crate::error::{Result, StudyError};
use crate::model::{Aggregate, Round, Study};
use crate::storage::{Committed, StudyStore, TransactionExecutor};
use crate::utils::retry::DEFAULT_STORE_RETRIES;

mod locks;
mod members;
mod queries;
mod settings;
mod stages;

pub use locks::LockRegistry;
pub use queries::{CurrentRound, ReadSource};

/// Default per-request deadline.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Who is asking, for which study, and how long they are willing to wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub group_id: String,
    pub actor_id: String,
    pub timeout: Duration,
}

impl RequestContext {
    pub fn new(group_id: impl Into<String>, actor_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            actor_id: actor_id.into(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Committed state handed back by mutating operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyUpdate {
    pub study: Study,
    /// The round the operation touched. Still set after a finalize, carrying
    /// the frozen round.
    pub round: Option<Round>,
}

impl From<Aggregate> for StudyUpdate {
    fn from(agg: Aggregate) -> Self {
        Self {
            study: agg.study,
            round: agg.round,
        }
    }
}

/// Service section of the configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Retries after a store write conflict.
    pub store_retry_attempts: usize,
    /// Default request deadline, in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            store_retry_attempts: DEFAULT_STORE_RETRIES,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,
        }
    }
}

impl ServiceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Tunables for [`StudyService`].
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub store_retries: usize,
    pub cache_ttl: Duration,
    pub populate_attempts: usize,
    pub populate_delay: Duration,
    pub publish_interval: Duration,
    pub publish_deadline: Duration,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self::from_sections(
            &ServiceConfig::default(),
            &CacheConfig::default(),
            &PublishConfig::default(),
        )
    }
}

impl ServiceOptions {
    pub fn from_sections(
        service: &ServiceConfig,
        cache: &CacheConfig,
        publish: &PublishConfig,
    ) -> Self {
        Self {
            store_retries: service.store_retry_attempts,
            cache_ttl: cache.ttl(),
            populate_attempts: cache.populate_attempts,
            populate_delay: cache.populate_delay(),
            publish_interval: publish.retry_interval(),
            publish_deadline: publish.deadline(),
        }
    }
}

/// Coordinates studies on behalf of external collaborators.
pub struct StudyService {
    executor: TransactionExecutor,
    locks: LockRegistry,
    cache: Arc<dyn RoundCache>,
    populator: CachePopulator,
    publisher: ReliablePublisher,
    background: TaskTracker,
    cache_ttl: Duration,
}

impl StudyService {
    pub fn new(
        store: Arc<dyn StudyStore>,
        cache: Arc<dyn RoundCache>,
        bus: Arc<dyn EventBus>,
        options: ServiceOptions,
    ) -> Self {
        let populator = CachePopulator::new(
            cache.clone(),
            options.populate_attempts,
            options.populate_delay,
            options.cache_ttl,
        );
        Self {
            executor: TransactionExecutor::new(store, options.store_retries),
            locks: LockRegistry::new(),
            cache,
            populator,
            publisher: ReliablePublisher::new(
                bus,
                options.publish_interval,
                options.publish_deadline,
            ),
            background: TaskTracker::new(),
            cache_ttl: options.cache_ttl,
        }
    }

    pub fn store(&self) -> &Arc<dyn StudyStore> {
        self.executor.store()
    }

    /// Wait for in-flight publications, then stop cache population.
    pub async fn shutdown(&self) {
        self.background.close();
        self.background.wait().await;
        self.populator.shutdown().await;
    }

    /// Run `unit_of_work` under the study lock and refresh the cache with
    /// the committed result.
    async fn mutate<T, F>(&self, ctx: &RequestContext, unit_of_work: F) -> Result<Committed<T>>
    where
        T: Send,
        F: Fn(Aggregate) -> Result<(Aggregate, T)> + Send + Sync,
    {
        let started = Instant::now();
        let lock = self.locks.lock_for(&ctx.group_id);
        let guard = tokio::time::timeout(ctx.timeout, lock.lock_owned())
            .await
            .map_err(|_| StudyError::Timeout(ctx.timeout))?;

        let remaining = ctx.timeout.saturating_sub(started.elapsed());
        let committed = self
            .executor
            .execute(remaining, &ctx.group_id, unit_of_work)
            .await?;

        let remaining = ctx.timeout.saturating_sub(started.elapsed());
        self.refresh_cache(&ctx.group_id, &committed.aggregate, remaining)
            .await;
        drop(guard);

        Ok(committed)
    }

    /// Best-effort: put the ongoing round in the cache, or drop the entry
    /// once the study is idle. Bounded by what is left of the request
    /// deadline.
    async fn refresh_cache(&self, group_id: &str, agg: &Aggregate, deadline: Duration) {
        let refresh = async {
            match (&agg.round, agg.study.has_ongoing_round()) {
                (Some(round), true) => self.cache.set(group_id, round, self.cache_ttl).await,
                _ => self.cache.remove(group_id).await,
            }
        };

        match tokio::time::timeout(deadline, refresh).await {
            Ok(Ok(())) => debug!(%group_id, "Cache refreshed"),
            Ok(Err(e)) => warn!(%group_id, error = %e, "Cache refresh failed"),
            Err(_) => warn!(%group_id, "Cache refresh timed out"),
        }
    }

    /// Publish `event` from a tracked background task.
    fn publish(&self, event: StudyEvent) {
        let publisher = self.publisher.clone();
        self.background.spawn(async move {
            let topic = event.topic;
            let event_id = event.id.clone();
            if let Err(e) = publisher.publish(Arc::new(event)).await {
                error!(%topic, %event_id, error = %e, "Dropping study event");
            }
        });
    }
}

/// Fail with `PermissionDenied` unless `actor_id` manages the study.
fn require_manager(study: &Study, actor_id: &str, action: &'static str) -> Result<()> {
    if study.is_manager(actor_id) {
        Ok(())
    } else {
        Err(StudyError::PermissionDenied {
            actor_id: actor_id.to_string(),
            action,
        })
    }
}
