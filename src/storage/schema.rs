//! Database schema definitions using sea-query.
//!
//! Studies and rounds are stored as JSON documents beside the version
//! column that guards every update.

use sea_query::Iden;

/// Studies table schema.
#[derive(Iden)]
pub enum Studies {
    Table,
    #[iden = "group_id"]
    GroupId,
    #[iden = "study_id"]
    StudyId,
    #[iden = "version"]
    Version,
    #[iden = "document"]
    Document,
    #[iden = "updated_at"]
    UpdatedAt,
}

/// Rounds table schema.
#[derive(Iden)]
pub enum Rounds {
    Table,
    #[iden = "round_id"]
    RoundId,
    #[iden = "study_id"]
    StudyId,
    #[iden = "version"]
    Version,
    #[iden = "document"]
    Document,
    #[iden = "updated_at"]
    UpdatedAt,
}

/// SQL for creating the studies table.
pub const CREATE_STUDIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS studies (
    group_id TEXT NOT NULL PRIMARY KEY,
    study_id TEXT NOT NULL,
    version INTEGER NOT NULL,
    document TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// SQL for creating the rounds table.
pub const CREATE_ROUNDS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS rounds (
    round_id TEXT NOT NULL PRIMARY KEY,
    study_id TEXT NOT NULL,
    version INTEGER NOT NULL,
    document TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_rounds_study ON rounds(study_id);
"#;
