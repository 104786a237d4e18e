//! Errors returned by the service façade.
//!
//! Every variant maps to an [`ErrorKind`] so adapters can branch on the
//! category, and to a [`StudyError::user_message`] they can show verbatim.

use std::time::Duration;

use crate::model::Stage;
use crate::storage::StorageError;

/// Result type for study operations.
pub type Result<T> = std::result::Result<T, StudyError>;

/// Coarse error categories exposed to collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    InvalidStage,
    AlreadyInState,
    SelfReferenceRejected,
    ValidationFailed,
    PermissionDenied,
    TransientStoreConflict,
    Timeout,
    Storage,
}

/// Errors that can occur while handling a study command.
#[derive(Debug, thiserror::Error)]
pub enum StudyError {
    #[error("Study not found for group {0}")]
    StudyNotFound(String),

    #[error("Round not found: {0}")]
    RoundNotFound(String),

    #[error("Member not found: {0}")]
    MemberNotFound(String),

    #[error("Cannot {action} during stage '{}'", .current.label())]
    InvalidStage { action: &'static str, current: Stage },

    #[error("Round {0} is finalized and can no longer change")]
    RoundFinalized(String),

    #[error("Study already exists for group {0}")]
    StudyExists(String),

    #[error("Member is already registered")]
    AlreadyRegistered,

    #[error("Member is not registered")]
    AlreadyUnregistered,

    #[error("Member must be registered")]
    NotRegistered,

    #[error("Member must have attended the presentation")]
    NotAttended,

    #[error("Reflection already sent")]
    ReflectionAlreadySent,

    #[error("Reviewer {reviewer_id} already reviewed this member")]
    AlreadyReviewed { reviewer_id: String },

    #[error("Members cannot review themselves")]
    SelfReview,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("User {actor_id} is not allowed to {action}")]
    PermissionDenied {
        actor_id: String,
        action: &'static str,
    },

    #[error("Transaction conflict persisted after {attempts} attempts")]
    ConflictRetriesExhausted { attempts: usize },

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl StudyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StudyError::StudyNotFound(_)
            | StudyError::RoundNotFound(_)
            | StudyError::MemberNotFound(_) => ErrorKind::NotFound,
            StudyError::InvalidStage { .. } | StudyError::RoundFinalized(_) => {
                ErrorKind::InvalidStage
            }
            StudyError::StudyExists(_)
            | StudyError::AlreadyRegistered
            | StudyError::AlreadyUnregistered
            | StudyError::ReflectionAlreadySent
            | StudyError::AlreadyReviewed { .. } => ErrorKind::AlreadyInState,
            StudyError::SelfReview => ErrorKind::SelfReferenceRejected,
            StudyError::NotRegistered | StudyError::NotAttended | StudyError::Validation(_) => {
                ErrorKind::ValidationFailed
            }
            StudyError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            StudyError::ConflictRetriesExhausted { .. } => ErrorKind::TransientStoreConflict,
            StudyError::Timeout(_) => ErrorKind::Timeout,
            StudyError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Message suitable for showing to the user who issued the command.
    ///
    /// Storage internals are not leaked; everything else reads the same as
    /// the `Display` form.
    pub fn user_message(&self) -> String {
        match self {
            StudyError::StudyNotFound(_) => "No study has been set up for this group yet.".into(),
            StudyError::RoundNotFound(_) => "There is no round in progress.".into(),
            StudyError::MemberNotFound(_) => {
                "That participant has not joined the current round.".into()
            }
            StudyError::InvalidStage { action, current } => {
                format!("You cannot {action} during the {} stage.", current.label())
            }
            StudyError::RoundFinalized(_) => "This round has already finished.".into(),
            StudyError::StudyExists(_) => "A study already exists for this group.".into(),
            StudyError::ConflictRetriesExhausted { .. } | StudyError::Storage(_) => {
                "Something went wrong while saving. Please try again.".into()
            }
            StudyError::Timeout(_) => "The request took too long. Please try again.".into(),
            other => other.to_string(),
        }
    }
}
