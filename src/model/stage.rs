//! Study lifecycle stages.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A point in the study lifecycle.
///
/// Stages form a total order. `Wait` is the idle stage between rounds and
/// `Finished` is only ever observed on a finalized [`Round`](super::Round):
/// a study reaching it folds straight back to `Wait`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Wait,
    RegistrationOpen,
    RegistrationClosed,
    SubmissionOpen,
    SubmissionClosed,
    PresentationStarted,
    PresentationFinished,
    ReviewOpen,
    ReviewClosed,
    Finished,
}

impl Stage {
    /// Every stage, in lifecycle order.
    pub const ALL: [Stage; 10] = [
        Stage::Wait,
        Stage::RegistrationOpen,
        Stage::RegistrationClosed,
        Stage::SubmissionOpen,
        Stage::SubmissionClosed,
        Stage::PresentationStarted,
        Stage::PresentationFinished,
        Stage::ReviewOpen,
        Stage::ReviewClosed,
        Stage::Finished,
    ];

    /// Successor stage. Total: `Finished` wraps to `Wait`.
    pub fn next(self) -> Stage {
        match self {
            Stage::Wait => Stage::RegistrationOpen,
            Stage::RegistrationOpen => Stage::RegistrationClosed,
            Stage::RegistrationClosed => Stage::SubmissionOpen,
            Stage::SubmissionOpen => Stage::SubmissionClosed,
            Stage::SubmissionClosed => Stage::PresentationStarted,
            Stage::PresentationStarted => Stage::PresentationFinished,
            Stage::PresentationFinished => Stage::ReviewOpen,
            Stage::ReviewOpen => Stage::ReviewClosed,
            Stage::ReviewClosed => Stage::Finished,
            Stage::Finished => Stage::Wait,
        }
    }

    /// Human-readable name shown to participants.
    pub fn label(self) -> &'static str {
        match self {
            Stage::Wait => "waiting for the next round",
            Stage::RegistrationOpen => "speaker registration",
            Stage::RegistrationClosed => "speaker registration closed",
            Stage::SubmissionOpen => "material submission",
            Stage::SubmissionClosed => "material submission closed",
            Stage::PresentationStarted => "presentation",
            Stage::PresentationFinished => "presentation finished",
            Stage::ReviewOpen => "review",
            Stage::ReviewClosed => "review closed",
            Stage::Finished => "round finished",
        }
    }

    /// Stable machine name, used as the storage and wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Wait => "wait",
            Stage::RegistrationOpen => "registration_open",
            Stage::RegistrationClosed => "registration_closed",
            Stage::SubmissionOpen => "submission_open",
            Stage::SubmissionClosed => "submission_closed",
            Stage::PresentationStarted => "presentation_started",
            Stage::PresentationFinished => "presentation_finished",
            Stage::ReviewOpen => "review_open",
            Stage::ReviewClosed => "review_closed",
            Stage::Finished => "finished",
        }
    }

    /// True while a round is in progress.
    pub fn is_active(self) -> bool {
        !matches!(self, Stage::Wait | Stage::Finished)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
