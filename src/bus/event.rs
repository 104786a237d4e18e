//! Events emitted after a study command commits.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{Stage, Study};

/// Routing topic of a [`StudyEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    #[serde(rename = "study.created")]
    StudyCreated,
    #[serde(rename = "study.stage.changed")]
    StageChanged,
    #[serde(rename = "study.round.finished")]
    RoundFinished,
    #[serde(rename = "study.member.registered")]
    MemberRegistered,
    #[serde(rename = "study.member.unregistered")]
    MemberUnregistered,
    #[serde(rename = "study.member.content_submitted")]
    ContentSubmitted,
    #[serde(rename = "study.member.attendance")]
    AttendanceMarked,
    #[serde(rename = "study.round.content_submitted")]
    RoundContentSubmitted,
    #[serde(rename = "study.member.reviewer_assigned")]
    ReviewerAssigned,
    #[serde(rename = "study.member.reflection_sent")]
    ReflectionSent,
    #[serde(rename = "study.settings.updated")]
    SettingsUpdated,
}

impl Topic {
    pub const ALL: [Topic; 11] = [
        Topic::StudyCreated,
        Topic::StageChanged,
        Topic::RoundFinished,
        Topic::MemberRegistered,
        Topic::MemberUnregistered,
        Topic::ContentSubmitted,
        Topic::AttendanceMarked,
        Topic::RoundContentSubmitted,
        Topic::ReviewerAssigned,
        Topic::ReflectionSent,
        Topic::SettingsUpdated,
    ];

    /// Topic string used as routing key and header value.
    pub fn as_str(self) -> &'static str {
        match self {
            Topic::StudyCreated => "study.created",
            Topic::StageChanged => "study.stage.changed",
            Topic::RoundFinished => "study.round.finished",
            Topic::MemberRegistered => "study.member.registered",
            Topic::MemberUnregistered => "study.member.unregistered",
            Topic::ContentSubmitted => "study.member.content_submitted",
            Topic::AttendanceMarked => "study.member.attendance",
            Topic::RoundContentSubmitted => "study.round.content_submitted",
            Topic::ReviewerAssigned => "study.member.reviewer_assigned",
            Topic::ReflectionSent => "study.member.reflection_sent",
            Topic::SettingsUpdated => "study.settings.updated",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .into_iter()
            .find(|topic| topic.as_str() == s)
            .ok_or_else(|| format!("unknown topic: {s}"))
    }
}

/// Notification that something happened to a study.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyEvent {
    pub id: String,
    pub topic: Topic,
    pub group_id: String,
    pub study_id: String,
    /// Round the event concerns; empty for study-level events.
    #[serde(default)]
    pub round_id: String,
    /// Stage after the change.
    pub stage: Stage,
    /// User whose command produced the event.
    pub actor_id: String,
    #[serde(default)]
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

impl StudyEvent {
    pub fn new(topic: Topic, study: &Study, actor_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            topic,
            group_id: study.group_id.clone(),
            study_id: study.id.clone(),
            round_id: study.ongoing_round_id.clone(),
            stage: study.current_stage,
            actor_id: actor_id.into(),
            description: String::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_round(mut self, round_id: impl Into<String>) -> Self {
        self.round_id = round_id.into();
        self
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// JSON wire form.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_json(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }
}
