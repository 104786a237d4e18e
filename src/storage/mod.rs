//! Transactional storage for studies and rounds.
//!
//! This module contains:
//! - `StudyStore` trait: version-guarded persistence of the two aggregates
//! - `TransactionExecutor`: runs pure units of work with conflict retry
//! - Implementations: in-memory, SQLite

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{error, info};

use crate::model::{Aggregate, Round, Study};

mod executor;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use executor::{Committed, TransactionExecutor};
pub use memory::InMemoryStudyStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStudyStore;

// ============================================================================
// Traits
// ============================================================================

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Another writer committed first, or the backend was busy. Retryable.
    #[error("Write conflict on {entity} {id}")]
    Conflict { entity: &'static str, id: String },

    #[error("Study already exists for group {0}")]
    StudyExists(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown storage type: {0}")]
    UnknownBackend(String),
}

impl StorageError {
    /// True for errors a fresh attempt may not hit again.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict { .. })
    }
}

/// Documents to persist in one atomic commit.
///
/// Each document carries the version it was loaded with. The store rejects
/// the whole commit with [`StorageError::Conflict`] when a stored version
/// has moved on. A round with version 0 has never been stored and is
/// inserted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSet {
    pub study: Option<Study>,
    pub round: Option<Round>,
}

impl WriteSet {
    /// Documents that differ between what was loaded and what a unit of
    /// work handed back.
    pub fn diff(loaded: &Aggregate, updated: &Aggregate) -> Self {
        let study = (loaded.study != updated.study).then(|| updated.study.clone());
        let round = match (&loaded.round, &updated.round) {
            (_, None) => None,
            (Some(before), Some(after)) if before == after => None,
            (_, Some(after)) => Some(after.clone()),
        };
        Self { study, round }
    }

    pub fn is_empty(&self) -> bool {
        self.study.is_none() && self.round.is_none()
    }
}

/// Interface for study persistence.
///
/// Reads always observe the latest committed state. `commit` is atomic
/// across both documents: either every write lands or none does.
///
/// Implementations:
/// - `InMemoryStudyStore`: process-local maps behind one lock
/// - `SqliteStudyStore`: SQLite via sqlx
#[async_trait]
pub trait StudyStore: Send + Sync {
    /// Load the study owned by `group_id`.
    async fn find_study(&self, group_id: &str) -> Result<Option<Study>>;

    /// Load a round by id.
    async fn find_round(&self, round_id: &str) -> Result<Option<Round>>;

    /// Store a brand new study. Fails with `StudyExists` when the group
    /// already has one.
    async fn insert_study(&self, study: &Study) -> Result<()>;

    /// Atomically persist a write set.
    async fn commit(&self, writes: WriteSet) -> Result<()>;
}

// ============================================================================
// Configuration
// ============================================================================

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage type: "memory" or "sqlite".
    #[serde(rename = "type")]
    pub storage_type: String,
    /// Database file path (sqlite).
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: "sqlite".to_string(),
            path: "./data/study.db".to_string(),
        }
    }
}

/// Initialize storage based on configuration.
pub async fn init_storage(config: &StorageConfig) -> Result<Arc<dyn StudyStore>> {
    info!(storage_type = %config.storage_type, path = %config.path, "Initializing storage");

    match config.storage_type.as_str() {
        "memory" => Ok(Arc::new(InMemoryStudyStore::new())),
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let store = SqliteStudyStore::connect(&config.path).await?;
            store.init().await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "sqlite"))]
        "sqlite" => {
            error!("SQLite storage requested but 'sqlite' feature is not enabled");
            Err(StorageError::UnknownBackend("sqlite".to_string()))
        }
        other => {
            error!(storage_type = %other, "Unknown storage type");
            Err(StorageError::UnknownBackend(other.to_string()))
        }
    }
}

#[cfg(test)]
mod tests;
