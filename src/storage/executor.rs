//! Retrying transaction executor.
//!
//! Loads the aggregate, hands it to a pure unit of work, writes back only
//! what changed. Conflicts are retried with backoff; domain errors from the
//! unit of work are returned on the first attempt.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tracing::{debug, warn};

use super::{StorageError, StudyStore, WriteSet};
use crate::error::{Result, StudyError};
use crate::model::{Aggregate, Study};
use crate::utils::retry::store_backoff;

/// Outcome of a committed unit of work.
#[derive(Debug, Clone)]
pub struct Committed<T> {
    /// Aggregate as it now stands in the store, versions included.
    pub aggregate: Aggregate,
    pub value: T,
}

/// Runs units of work against a [`StudyStore`] with optimistic retry.
#[derive(Clone)]
pub struct TransactionExecutor {
    store: Arc<dyn StudyStore>,
    backoff: ExponentialBuilder,
}

impl TransactionExecutor {
    /// Executor retrying conflicts up to `max_retries` times.
    pub fn new(store: Arc<dyn StudyStore>, max_retries: usize) -> Self {
        Self {
            store,
            backoff: store_backoff(max_retries),
        }
    }

    pub fn store(&self) -> &Arc<dyn StudyStore> {
        &self.store
    }

    /// Persist a brand new study.
    pub async fn create(&self, deadline: Duration, study: Study) -> Result<Study> {
        let insert = self.store.insert_study(&study);
        match tokio::time::timeout(deadline, insert).await {
            Err(_) => Err(StudyError::Timeout(deadline)),
            Ok(Err(StorageError::StudyExists(group_id))) => Err(StudyError::StudyExists(group_id)),
            Ok(Err(e)) => Err(e.into()),
            Ok(Ok(())) => {
                let mut stored = study;
                stored.version = 1;
                Ok(stored)
            }
        }
    }

    /// Run `unit_of_work` against the committed state of `group_id`.
    ///
    /// The closure is called once per attempt with a freshly loaded
    /// aggregate and must not perform side effects. Whatever it returns is
    /// compared against what was loaded and only changed documents are
    /// written. The whole call, retries included, is bounded by `deadline`.
    pub async fn execute<T, F>(
        &self,
        deadline: Duration,
        group_id: &str,
        unit_of_work: F,
    ) -> Result<Committed<T>>
    where
        T: Send,
        F: Fn(Aggregate) -> Result<(Aggregate, T)> + Send + Sync,
    {
        let counter = AtomicUsize::new(0);
        let attempts = &counter;
        let unit_of_work = &unit_of_work;

        let run = (move || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            self.attempt(group_id, unit_of_work).await
        })
        .retry(self.backoff)
        .when(is_conflict)
        .notify(|err: &StudyError, delay: Duration| {
            debug!(%group_id, error = %err, ?delay, "Retrying after write conflict");
        });

        let result = tokio::time::timeout(deadline, run)
            .await
            .map_err(|_| StudyError::Timeout(deadline))?;

        match result {
            Err(e) if is_conflict(&e) => {
                let attempts = counter.load(Ordering::SeqCst);
                warn!(%group_id, attempts, "Write conflict retries exhausted");
                Err(StudyError::ConflictRetriesExhausted { attempts })
            }
            other => other,
        }
    }

    async fn attempt<T, F>(&self, group_id: &str, unit_of_work: &F) -> Result<Committed<T>>
    where
        T: Send,
        F: Fn(Aggregate) -> Result<(Aggregate, T)> + Send + Sync,
    {
        let loaded = self.load(group_id).await?;
        let (mut updated, value) = unit_of_work(loaded.clone())?;

        let writes = WriteSet::diff(&loaded, &updated);
        if writes.is_empty() {
            return Ok(Committed {
                aggregate: updated,
                value,
            });
        }

        let wrote_study = writes.study.is_some();
        let wrote_round = writes.round.is_some();
        self.store.commit(writes).await?;

        if wrote_study {
            updated.study.version += 1;
        }
        if let (true, Some(round)) = (wrote_round, updated.round.as_mut()) {
            round.version += 1;
        }

        Ok(Committed {
            aggregate: updated,
            value,
        })
    }

    async fn load(&self, group_id: &str) -> Result<Aggregate> {
        let study = self
            .store
            .find_study(group_id)
            .await?
            .ok_or_else(|| StudyError::StudyNotFound(group_id.to_string()))?;

        let round = if study.has_ongoing_round() {
            let round = self
                .store
                .find_round(&study.ongoing_round_id)
                .await?
                .ok_or_else(|| StudyError::RoundNotFound(study.ongoing_round_id.clone()))?;
            Some(round)
        } else {
            None
        };

        Ok(Aggregate::new(study, round))
    }
}

fn is_conflict(err: &StudyError) -> bool {
    matches!(err, StudyError::Storage(e) if e.is_conflict())
}
