//! In-memory study store.
//!
//! Both maps sit behind a single lock so a commit that touches the study
//! and its round is atomic. Used for local development and tests; can be
//! told to fail the next N commits with a conflict.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{Result, StorageError, StudyStore, WriteSet};
use crate::model::{Round, Study};

#[derive(Default)]
struct Tables {
    /// Keyed by group id.
    studies: HashMap<String, Study>,
    rounds: HashMap<String, Round>,
}

/// Study store that keeps everything in process memory.
#[derive(Default)]
pub struct InMemoryStudyStore {
    tables: RwLock<Tables>,
    injected_conflicts: AtomicUsize,
    commits: AtomicUsize,
}

impl InMemoryStudyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `count` commits with a conflict.
    pub fn inject_conflicts(&self, count: usize) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }

    /// Number of commits that went through.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    fn take_injected_conflict(&self) -> bool {
        self.injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl StudyStore for InMemoryStudyStore {
    async fn find_study(&self, group_id: &str) -> Result<Option<Study>> {
        Ok(self.tables.read().await.studies.get(group_id).cloned())
    }

    async fn find_round(&self, round_id: &str) -> Result<Option<Round>> {
        Ok(self.tables.read().await.rounds.get(round_id).cloned())
    }

    async fn insert_study(&self, study: &Study) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.studies.contains_key(&study.group_id) {
            return Err(StorageError::StudyExists(study.group_id.clone()));
        }
        let mut stored = study.clone();
        stored.version = 1;
        tables.studies.insert(stored.group_id.clone(), stored);
        Ok(())
    }

    async fn commit(&self, writes: WriteSet) -> Result<()> {
        if self.take_injected_conflict() {
            let id = writes
                .study
                .as_ref()
                .map(|s| s.group_id.clone())
                .unwrap_or_default();
            debug!(%id, "Injected write conflict");
            return Err(StorageError::Conflict {
                entity: "study",
                id,
            });
        }

        let mut tables = self.tables.write().await;

        // Validate everything before touching anything.
        if let Some(study) = &writes.study {
            let current = tables.studies.get(&study.group_id).map(|s| s.version);
            if current != Some(study.version) {
                return Err(StorageError::Conflict {
                    entity: "study",
                    id: study.group_id.clone(),
                });
            }
        }
        if let Some(round) = &writes.round {
            let current = tables.rounds.get(&round.id).map(|r| r.version);
            let expected = (round.version != 0).then_some(round.version);
            if current != expected {
                return Err(StorageError::Conflict {
                    entity: "round",
                    id: round.id.clone(),
                });
            }
        }

        if let Some(mut study) = writes.study {
            study.version += 1;
            tables.studies.insert(study.group_id.clone(), study);
        }
        if let Some(mut round) = writes.round {
            round.version += 1;
            tables.rounds.insert(round.id.clone(), round);
        }

        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
