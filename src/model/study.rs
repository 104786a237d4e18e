//! The per-group workflow record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Stage;

/// Authoritative workflow record for one group.
///
/// `ongoing_round_id` is non-empty exactly while `current_stage` is active
/// (strictly between `Wait` and `Finished`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Study {
    pub id: String,
    pub group_id: String,
    pub current_stage: Stage,
    #[serde(default)]
    pub ongoing_round_id: String,
    pub manager_id: String,
    #[serde(default)]
    pub notice_channel_id: String,
    #[serde(default)]
    pub reflection_channel_id: String,
    /// External report (spreadsheet) link.
    #[serde(default)]
    pub report_url: Option<String>,
    /// Rounds opened so far.
    #[serde(default)]
    pub round_count: u32,
    /// Optimistic concurrency counter, owned by the store.
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Study {
    pub fn new(group_id: impl Into<String>, manager_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            group_id: group_id.into(),
            current_stage: Stage::Wait,
            ongoing_round_id: String::new(),
            manager_id: manager_id.into(),
            notice_channel_id: String::new(),
            reflection_channel_id: String::new(),
            report_url: None,
            round_count: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_manager(&self, user_id: &str) -> bool {
        self.manager_id == user_id
    }

    pub fn has_ongoing_round(&self) -> bool {
        !self.ongoing_round_id.is_empty()
    }

    pub fn set_stage(&mut self, stage: Stage) {
        self.current_stage = stage;
        self.touch();
    }

    pub fn set_ongoing_round_id(&mut self, round_id: impl Into<String>) {
        self.ongoing_round_id = round_id.into();
        self.touch();
    }

    /// Reserve the number for the next round.
    pub fn next_round_number(&mut self) -> u32 {
        self.round_count += 1;
        self.touch();
        self.round_count
    }

    pub fn set_manager_id(&mut self, manager_id: impl Into<String>) {
        self.manager_id = manager_id.into();
        self.touch();
    }

    pub fn set_notice_channel_id(&mut self, channel_id: impl Into<String>) {
        self.notice_channel_id = channel_id.into();
        self.touch();
    }

    pub fn set_reflection_channel_id(&mut self, channel_id: impl Into<String>) {
        self.reflection_channel_id = channel_id.into();
        self.touch();
    }

    pub fn set_report_url(&mut self, url: impl Into<String>) {
        self.report_url = Some(url.into());
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
