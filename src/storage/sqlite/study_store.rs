//! SQLite StudyStore implementation.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sea_query::{Expr, Query, SqliteQueryBuilder};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{debug, warn};

use crate::model::{Round, Study};
use crate::storage::schema::{Rounds, Studies, CREATE_ROUNDS_TABLE, CREATE_STUDIES_TABLE};
use crate::storage::{Result, StorageError, StudyStore, WriteSet};

/// SQLite result codes for a locked or busy database.
const BUSY_CODES: [&str; 3] = ["5", "6", "517"];

/// SQLite implementation of StudyStore.
pub struct SqliteStudyStore {
    pool: SqlitePool,
}

impl SqliteStudyStore {
    /// Create a new SQLite study store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the database file at `path`.
    pub async fn connect(path: &str) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let opts = SqliteConnectOptions::new()
            .filename(path)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?;

        Ok(Self::new(pool))
    }

    /// Create tables if they do not exist.
    pub async fn init(&self) -> Result<()> {
        sqlx::raw_sql(CREATE_STUDIES_TABLE)
            .execute(&self.pool)
            .await?;
        sqlx::raw_sql(CREATE_ROUNDS_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    async fn write_study(conn: &mut SqliteConnection, study: &Study) -> Result<()> {
        let mut stored = study.clone();
        stored.version += 1;
        let document = serde_json::to_string(&stored)?;

        let query = Query::update()
            .table(Studies::Table)
            .values([
                (Studies::Version, (stored.version as i64).into()),
                (Studies::Document, document.into()),
                (Studies::UpdatedAt, Utc::now().to_rfc3339().into()),
            ])
            .and_where(Expr::col(Studies::GroupId).eq(study.group_id.as_str()))
            .and_where(Expr::col(Studies::Version).eq(study.version as i64))
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&mut *conn).await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::Conflict {
                entity: "study",
                id: study.group_id.clone(),
            });
        }
        Ok(())
    }

    async fn write_round(conn: &mut SqliteConnection, round: &Round) -> Result<()> {
        let mut stored = round.clone();
        stored.version += 1;
        let document = serde_json::to_string(&stored)?;
        let now = Utc::now().to_rfc3339();

        let query = if round.version == 0 {
            Query::insert()
                .into_table(Rounds::Table)
                .columns([
                    Rounds::RoundId,
                    Rounds::StudyId,
                    Rounds::Version,
                    Rounds::Document,
                    Rounds::UpdatedAt,
                ])
                .values_panic([
                    round.id.as_str().into(),
                    round.study_id.as_str().into(),
                    (stored.version as i64).into(),
                    document.into(),
                    now.into(),
                ])
                .to_string(SqliteQueryBuilder)
        } else {
            Query::update()
                .table(Rounds::Table)
                .values([
                    (Rounds::Version, (stored.version as i64).into()),
                    (Rounds::Document, document.into()),
                    (Rounds::UpdatedAt, now.into()),
                ])
                .and_where(Expr::col(Rounds::RoundId).eq(round.id.as_str()))
                .and_where(Expr::col(Rounds::Version).eq(round.version as i64))
                .to_string(SqliteQueryBuilder)
        };

        let conflict = || StorageError::Conflict {
            entity: "round",
            id: round.id.clone(),
        };

        match sqlx::query(&query).execute(&mut *conn).await {
            Ok(result) if result.rows_affected() == 0 => Err(conflict()),
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(conflict()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(conn: &mut SqliteConnection, writes: &WriteSet) -> Result<()> {
        if let Some(study) = &writes.study {
            Self::write_study(conn, study).await?;
        }
        if let Some(round) = &writes.round {
            Self::write_round(conn, round).await?;
        }
        Ok(())
    }
}

/// Busy and locked databases are contention, not failure.
fn classify(err: sqlx::Error, entity: &'static str, id: &str) -> StorageError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().is_some_and(|code| BUSY_CODES.contains(&code.as_ref())) {
            return StorageError::Conflict {
                entity,
                id: id.to_string(),
            };
        }
    }
    StorageError::Database(err)
}

fn conflict_key(writes: &WriteSet) -> (&'static str, String) {
    match (&writes.study, &writes.round) {
        (Some(study), _) => ("study", study.group_id.clone()),
        (None, Some(round)) => ("round", round.id.clone()),
        (None, None) => ("study", String::new()),
    }
}

#[async_trait]
impl StudyStore for SqliteStudyStore {
    async fn find_study(&self, group_id: &str) -> Result<Option<Study>> {
        let query = Query::select()
            .column(Studies::Document)
            .from(Studies::Table)
            .and_where(Expr::col(Studies::GroupId).eq(group_id))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        match row {
            Some(row) => {
                let document: String = row.get("document");
                Ok(Some(serde_json::from_str(&document)?))
            }
            None => Ok(None),
        }
    }

    async fn find_round(&self, round_id: &str) -> Result<Option<Round>> {
        let query = Query::select()
            .column(Rounds::Document)
            .from(Rounds::Table)
            .and_where(Expr::col(Rounds::RoundId).eq(round_id))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        match row {
            Some(row) => {
                let document: String = row.get("document");
                Ok(Some(serde_json::from_str(&document)?))
            }
            None => Ok(None),
        }
    }

    async fn insert_study(&self, study: &Study) -> Result<()> {
        let mut stored = study.clone();
        stored.version = 1;
        let document = serde_json::to_string(&stored)?;

        let query = Query::insert()
            .into_table(Studies::Table)
            .columns([
                Studies::GroupId,
                Studies::StudyId,
                Studies::Version,
                Studies::Document,
                Studies::UpdatedAt,
            ])
            .values_panic([
                study.group_id.as_str().into(),
                study.id.as_str().into(),
                1i64.into(),
                document.into(),
                Utc::now().to_rfc3339().into(),
            ])
            .to_string(SqliteQueryBuilder);

        match sqlx::query(&query).execute(&self.pool).await {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StorageError::StudyExists(study.group_id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn commit(&self, writes: WriteSet) -> Result<()> {
        if writes.is_empty() {
            return Ok(());
        }
        let (entity, id) = conflict_key(&writes);

        // BEGIN IMMEDIATE takes the write lock upfront so two writers never
        // both hold a read snapshot and race to upgrade. The transaction
        // rolls back when dropped, including when the caller's deadline
        // cancels this future mid-flight.
        let mut tx = self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(|e| classify(e, entity, &id))?;

        if let Err(e) = Self::write_all(&mut tx, &writes).await {
            debug!(error = %e, "Rolling back study commit");
            if let Err(rollback) = tx.rollback().await {
                warn!(error = %rollback, "Rollback failed");
            }
            return match e {
                StorageError::Database(inner) => Err(classify(inner, entity, &id)),
                other => Err(other),
            };
        }

        // A failed COMMIT leaves the transaction open; sqlx rolls it back
        // before the connection returns to the pool.
        tx.commit().await.map_err(|e| classify(e, entity, &id))
    }
}
