//! Per-participant state within a round.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StudyError};

/// A participant's progress within one round.
///
/// Created lazily on first registration and never removed; unregistering
/// only flips `registered` back and clears the profile fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Member {
    pub name: String,
    pub registered: bool,
    pub subject: String,
    pub attended: bool,
    pub content_url: String,
    pub sent_reflection: bool,
    pub reviewers: BTreeSet<String>,
}

impl Member {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register as a speaker with the given name and subject.
    pub fn register(&mut self, name: &str, subject: &str) -> Result<()> {
        if self.registered {
            return Err(StudyError::AlreadyRegistered);
        }
        self.name = name.to_string();
        self.subject = subject.to_string();
        self.registered = true;
        Ok(())
    }

    /// Withdraw a registration, clearing name and subject.
    pub fn unregister(&mut self) -> Result<()> {
        if !self.registered {
            return Err(StudyError::AlreadyUnregistered);
        }
        self.name.clear();
        self.subject.clear();
        self.registered = false;
        Ok(())
    }

    pub fn set_content_url(&mut self, url: &str) -> Result<()> {
        self.ensure_registered()?;
        self.content_url = url.to_string();
        Ok(())
    }

    pub fn set_attended(&mut self, attended: bool) -> Result<()> {
        self.ensure_registered()?;
        self.attended = attended;
        Ok(())
    }

    /// Mark the reflection as sent. There is no way back.
    pub fn mark_reflection_sent(&mut self) -> Result<()> {
        self.ensure_presented()?;
        if self.sent_reflection {
            return Err(StudyError::ReflectionAlreadySent);
        }
        self.sent_reflection = true;
        Ok(())
    }

    /// Record `reviewer_id` as having reviewed this member.
    ///
    /// `member_id` is this member's own id, needed to reject self-review.
    pub fn add_reviewer(&mut self, member_id: &str, reviewer_id: &str) -> Result<()> {
        if member_id == reviewer_id {
            return Err(StudyError::SelfReview);
        }
        self.ensure_presented()?;
        if self.reviewers.contains(reviewer_id) {
            return Err(StudyError::AlreadyReviewed {
                reviewer_id: reviewer_id.to_string(),
            });
        }
        self.reviewers.insert(reviewer_id.to_string());
        Ok(())
    }

    pub fn is_reviewer(&self, reviewer_id: &str) -> bool {
        self.reviewers.contains(reviewer_id)
    }

    fn ensure_registered(&self) -> Result<()> {
        if !self.registered {
            return Err(StudyError::NotRegistered);
        }
        Ok(())
    }

    /// Registered and attended the presentation.
    fn ensure_presented(&self) -> Result<()> {
        self.ensure_registered()?;
        if !self.attended {
            return Err(StudyError::NotAttended);
        }
        Ok(())
    }
}
