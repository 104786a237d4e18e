//! One complete cycle of the study workflow.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Member, Stage};
use crate::error::{Result, StudyError};

/// Per-cycle record holding every participant's state.
///
/// A round is never deleted. Once stamped [`Stage::Finished`] it is frozen
/// and every mutator fails with [`StudyError::RoundFinalized`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub id: String,
    pub study_id: String,
    pub number: u32,
    pub title: String,
    pub stage: Stage,
    #[serde(default)]
    pub content_url: String,
    #[serde(default)]
    pub members: HashMap<String, Member>,
    /// Optimistic concurrency counter, owned by the store.
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Round {
    pub fn new(study_id: impl Into<String>, number: u32, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            study_id: study_id.into(),
            number,
            title: title.into(),
            stage: Stage::Wait,
            content_url: String::new(),
            members: HashMap::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.stage == Stage::Finished
    }

    /// Stamp the round with the stage its study just moved to.
    pub fn stamp(&mut self, stage: Stage) -> Result<()> {
        self.ensure_open()?;
        self.stage = stage;
        self.touch();
        Ok(())
    }

    pub fn member(&self, member_id: &str) -> Option<&Member> {
        self.members.get(member_id)
    }

    /// Mutable access to an existing member.
    pub fn member_mut(&mut self, member_id: &str) -> Result<&mut Member> {
        self.ensure_open()?;
        self.touch();
        self.members
            .get_mut(member_id)
            .ok_or_else(|| StudyError::MemberNotFound(member_id.to_string()))
    }

    /// Mutable access to a member, creating it on first use.
    pub fn member_entry(&mut self, member_id: &str) -> Result<&mut Member> {
        self.ensure_open()?;
        self.touch();
        Ok(self.members.entry(member_id.to_string()).or_default())
    }

    /// Members currently registered as speakers.
    pub fn speakers(&self) -> impl Iterator<Item = (&String, &Member)> {
        self.members.iter().filter(|(_, m)| m.registered)
    }

    pub fn set_content_url(&mut self, url: &str) -> Result<()> {
        self.ensure_open()?;
        self.content_url = url.to_string();
        self.touch();
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_finalized() {
            return Err(StudyError::RoundFinalized(self.id.clone()));
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
