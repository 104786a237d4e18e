//! Read paths. The current round is read cache-first; everything else goes
//! straight to the store.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use super::{RequestContext, StudyService, DEFAULT_REQUEST_TIMEOUT};
use crate::cache::PopulateTicket;
use crate::error::{Result, StudyError};
use crate::model::{Round, Study};

/// Where a current-round read was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    Cache,
    Store,
}

/// Result of [`StudyService::read_current_round`].
///
/// A store read schedules a cache write that runs after this returns. If a
/// mutation commits in between, the write is skipped when the cache already
/// holds a later version of the round. If the mutation instead finalized the
/// cycle and dropped the entry, the pre-finalize round is cached again and
/// served until its TTL runs out or the next cycle opens.
#[derive(Debug)]
pub struct CurrentRound {
    pub round: Round,
    pub source: ReadSource,
    /// Set on a store read; resolves once the cache write settles.
    pub population: Option<PopulateTicket>,
}

impl StudyService {
    /// Strongly consistent study lookup.
    pub async fn get_study(&self, group_id: &str) -> Result<Study> {
        let found = bounded(DEFAULT_REQUEST_TIMEOUT, self.store().find_study(group_id)).await?;
        found.ok_or_else(|| StudyError::StudyNotFound(group_id.to_string()))
    }

    /// Strongly consistent round lookup, finished rounds included.
    pub async fn get_round(&self, round_id: &str) -> Result<Round> {
        let found = bounded(DEFAULT_REQUEST_TIMEOUT, self.store().find_round(round_id)).await?;
        found.ok_or_else(|| StudyError::RoundNotFound(round_id.to_string()))
    }

    /// The study's ongoing round. May lag the store by up to one cache TTL,
    /// and for that long may still return a round that was just finalized.
    /// Use [`get_study`](Self::get_study) and [`get_round`](Self::get_round)
    /// when the latest state matters.
    pub async fn get_current_round(&self, ctx: &RequestContext) -> Result<Round> {
        Ok(self.read_current_round(ctx).await?.round)
    }

    /// Like [`get_current_round`](Self::get_current_round), also reporting
    /// where the round came from.
    ///
    /// A cache miss, or a cache error, falls back to the store and schedules
    /// background population of the cache.
    #[instrument(skip_all, fields(group_id = %ctx.group_id))]
    pub async fn read_current_round(&self, ctx: &RequestContext) -> Result<CurrentRound> {
        let group_id = ctx.group_id.as_str();

        match tokio::time::timeout(ctx.timeout, self.cache.get(group_id)).await {
            Ok(Ok(Some(round))) => {
                debug!(round_id = %round.id, "Current round served from cache");
                return Ok(CurrentRound {
                    round,
                    source: ReadSource::Cache,
                    population: None,
                });
            }
            Ok(Ok(None)) => debug!("Current round cache miss"),
            Ok(Err(e)) => warn!(error = %e, "Cache read failed, falling back to store"),
            Err(_) => warn!("Cache read timed out, falling back to store"),
        }

        let round = bounded(ctx.timeout, self.load_current_round(group_id)).await?;
        let population = self.populator.populate(group_id, round.clone());

        Ok(CurrentRound {
            round,
            source: ReadSource::Store,
            population: Some(population),
        })
    }

    async fn load_current_round(&self, group_id: &str) -> Result<Round> {
        let study = self
            .store()
            .find_study(group_id)
            .await?
            .ok_or_else(|| StudyError::StudyNotFound(group_id.to_string()))?;
        if !study.has_ongoing_round() {
            return Err(StudyError::RoundNotFound(format!(
                "no ongoing round for group {group_id}"
            )));
        }

        self.store()
            .find_round(&study.ongoing_round_id)
            .await?
            .ok_or_else(|| StudyError::RoundNotFound(study.ongoing_round_id.clone()))
    }
}

async fn bounded<T, E, F>(deadline: Duration, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: Into<StudyError>,
{
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| StudyError::Timeout(deadline))?
        .map_err(Into::into)
}
