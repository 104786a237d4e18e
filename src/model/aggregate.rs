//! The unit a transaction reads and writes.

use super::{Round, Study};
use crate::error::{Result, StudyError};

/// A study together with its ongoing round, if any.
///
/// Units of work receive an `Aggregate` loaded from committed state and hand
/// back the modified copy; the store decides what to write by comparing it
/// against what it loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate {
    pub study: Study,
    pub round: Option<Round>,
}

impl Aggregate {
    pub fn new(study: Study, round: Option<Round>) -> Self {
        Self { study, round }
    }

    /// The ongoing round, or `RoundNotFound` when the study is idle.
    pub fn round(&self) -> Result<&Round> {
        self.round
            .as_ref()
            .ok_or_else(|| StudyError::RoundNotFound(self.study.ongoing_round_id.clone()))
    }

    pub fn round_mut(&mut self) -> Result<&mut Round> {
        let ongoing = &self.study.ongoing_round_id;
        self.round
            .as_mut()
            .ok_or_else(|| StudyError::RoundNotFound(ongoing.clone()))
    }

    /// Borrow the study and the round mutably at the same time.
    pub fn parts_mut(&mut self) -> Result<(&mut Study, &mut Round)> {
        match self.round.as_mut() {
            Some(round) => Ok((&mut self.study, round)),
            None => Err(StudyError::RoundNotFound(
                self.study.ongoing_round_id.clone(),
            )),
        }
    }
}
