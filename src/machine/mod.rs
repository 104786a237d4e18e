//! Stage state machine.
//!
//! Pure functions over an [`Aggregate`]. Stage progression has exactly one
//! entry point, [`advance`], which moves the study to the successor of its
//! current stage. Commands such as "close submission" validate their own
//! precondition and then route through it.
//!
//! Field mutators (registration, submissions, attendance, reviews,
//! reflections) each declare a [`StageRequirement`]; a violation fails with
//! [`StudyError::InvalidStage`] carrying the current stage.
//!
//! Nothing in here performs I/O. The service façade runs these functions
//! inside a store transaction.

use crate::error::{Result, StudyError};
use crate::model::{Aggregate, Round, Stage, Study};

/// Every legal stage transition. `Finished` folds back to `Wait`.
pub const TRANSITIONS: [(Stage, Stage); 10] = [
    (Stage::Wait, Stage::RegistrationOpen),
    (Stage::RegistrationOpen, Stage::RegistrationClosed),
    (Stage::RegistrationClosed, Stage::SubmissionOpen),
    (Stage::SubmissionOpen, Stage::SubmissionClosed),
    (Stage::SubmissionClosed, Stage::PresentationStarted),
    (Stage::PresentationStarted, Stage::PresentationFinished),
    (Stage::PresentationFinished, Stage::ReviewOpen),
    (Stage::ReviewOpen, Stage::ReviewClosed),
    (Stage::ReviewClosed, Stage::Finished),
    (Stage::Finished, Stage::Wait),
];

/// Result of a successful stage transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Stage,
    /// Stage the round was stamped with. `Finished` means the study is back
    /// in `Wait`.
    pub to: Stage,
}

impl Transition {
    pub fn finished_round(&self) -> bool {
        self.to == Stage::Finished
    }
}

/// Commands that move a study forward one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageCommand {
    OpenRegistration,
    CloseRegistration,
    OpenSubmission,
    CloseSubmission,
    StartPresentation,
    FinishPresentation,
    OpenReview,
    CloseReview,
    Finalize,
}

impl StageCommand {
    pub const ALL: [StageCommand; 9] = [
        StageCommand::OpenRegistration,
        StageCommand::CloseRegistration,
        StageCommand::OpenSubmission,
        StageCommand::CloseSubmission,
        StageCommand::StartPresentation,
        StageCommand::FinishPresentation,
        StageCommand::OpenReview,
        StageCommand::CloseReview,
        StageCommand::Finalize,
    ];

    /// Stage the study must be in for this command to apply.
    pub fn required_stage(self) -> Stage {
        match self {
            StageCommand::OpenRegistration => Stage::Wait,
            StageCommand::CloseRegistration => Stage::RegistrationOpen,
            StageCommand::OpenSubmission => Stage::RegistrationClosed,
            StageCommand::CloseSubmission => Stage::SubmissionOpen,
            StageCommand::StartPresentation => Stage::SubmissionClosed,
            StageCommand::FinishPresentation => Stage::PresentationStarted,
            StageCommand::OpenReview => Stage::PresentationFinished,
            StageCommand::CloseReview => Stage::ReviewOpen,
            StageCommand::Finalize => Stage::ReviewClosed,
        }
    }

    /// Stage the round ends up stamped with.
    pub fn target(self) -> Stage {
        self.required_stage().next()
    }

    /// Verb phrase used in error messages ("cannot close submission ...").
    pub fn action(self) -> &'static str {
        match self {
            StageCommand::OpenRegistration => "open registration",
            StageCommand::CloseRegistration => "close registration",
            StageCommand::OpenSubmission => "open submission",
            StageCommand::CloseSubmission => "close submission",
            StageCommand::StartPresentation => "start the presentation",
            StageCommand::FinishPresentation => "finish the presentation",
            StageCommand::OpenReview => "open review",
            StageCommand::CloseReview => "close review",
            StageCommand::Finalize => "finalize the round",
        }
    }
}

/// Stage precondition declared by a field mutator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageRequirement {
    Exactly(Stage),
    AtLeast(Stage),
}

impl StageRequirement {
    pub fn is_met(self, current: Stage) -> bool {
        match self {
            StageRequirement::Exactly(stage) => current == stage,
            StageRequirement::AtLeast(stage) => current >= stage,
        }
    }

    pub fn check(self, current: Stage, action: &'static str) -> Result<()> {
        if self.is_met(current) {
            Ok(())
        } else {
            Err(StudyError::InvalidStage { action, current })
        }
    }
}

/// Move study and round to the successor of the study's stage.
///
/// When the successor is `Finished` the round is stamped `Finished` and the
/// study folds back to `Wait` with no ongoing round.
pub fn advance(study: &mut Study, round: &mut Round) -> Result<Transition> {
    if study.ongoing_round_id != round.id {
        return Err(StudyError::RoundNotFound(study.ongoing_round_id.clone()));
    }

    let from = study.current_stage;
    let next = from.next();

    round.stamp(next)?;
    if next == Stage::Finished {
        study.set_stage(Stage::Wait);
        study.set_ongoing_round_id("");
    } else {
        study.set_stage(next);
    }

    Ok(Transition { from, to: next })
}

/// Start a new round titled `title` and open registration for it.
pub fn open_registration(agg: &mut Aggregate, title: &str) -> Result<Transition> {
    let command = StageCommand::OpenRegistration;
    StageRequirement::Exactly(command.required_stage())
        .check(agg.study.current_stage, command.action())?;
    require_text("round title", title)?;

    let number = agg.study.next_round_number();
    let round = Round::new(agg.study.id.clone(), number, title.trim());
    agg.study.set_ongoing_round_id(round.id.clone());
    agg.round = Some(round);

    let (study, round) = agg.parts_mut()?;
    advance(study, round)
}

/// Apply a stage-advancing command other than [`StageCommand::OpenRegistration`].
pub fn apply(agg: &mut Aggregate, command: StageCommand) -> Result<Transition> {
    StageRequirement::Exactly(command.required_stage())
        .check(agg.study.current_stage, command.action())?;

    if command == StageCommand::OpenRegistration {
        return Err(StudyError::Validation(
            "opening registration requires a round title".into(),
        ));
    }

    let (study, round) = agg.parts_mut()?;
    advance(study, round)
}

pub const REGISTER: StageRequirement = StageRequirement::Exactly(Stage::RegistrationOpen);
pub const SUBMIT_CONTENT: StageRequirement = StageRequirement::Exactly(Stage::SubmissionOpen);
pub const MARK_ATTENDANCE: StageRequirement =
    StageRequirement::AtLeast(Stage::PresentationStarted);
pub const SUBMIT_ROUND_CONTENT: StageRequirement =
    StageRequirement::AtLeast(Stage::PresentationFinished);
pub const ASSIGN_REVIEWER: StageRequirement = StageRequirement::Exactly(Stage::ReviewOpen);
pub const RECORD_REFLECTION: StageRequirement =
    StageRequirement::AtLeast(Stage::PresentationFinished);

pub fn register_member(
    agg: &mut Aggregate,
    member_id: &str,
    name: &str,
    subject: &str,
) -> Result<()> {
    REGISTER.check(agg.study.current_stage, "register as a speaker")?;
    require_text("name", name)?;
    require_text("subject", subject)?;

    agg.round_mut()?
        .member_entry(member_id)?
        .register(name.trim(), subject.trim())
}

pub fn unregister_member(agg: &mut Aggregate, member_id: &str) -> Result<()> {
    REGISTER.check(agg.study.current_stage, "cancel a registration")?;

    let round = agg.round_mut()?;
    if round.member(member_id).is_none() {
        return Err(StudyError::AlreadyUnregistered);
    }
    round.member_mut(member_id)?.unregister()
}

pub fn submit_content(agg: &mut Aggregate, member_id: &str, url: &str) -> Result<()> {
    SUBMIT_CONTENT.check(agg.study.current_stage, "submit presentation material")?;
    require_text("content url", url)?;

    agg.round_mut()?
        .member_mut(member_id)?
        .set_content_url(url.trim())
}

pub fn mark_attendance(agg: &mut Aggregate, member_id: &str, attended: bool) -> Result<()> {
    MARK_ATTENDANCE.check(agg.study.current_stage, "check speaker attendance")?;

    agg.round_mut()?.member_mut(member_id)?.set_attended(attended)
}

pub fn submit_round_content(agg: &mut Aggregate, url: &str) -> Result<()> {
    SUBMIT_ROUND_CONTENT.check(agg.study.current_stage, "register the round material")?;
    require_text("content url", url)?;

    agg.round_mut()?.set_content_url(url.trim())
}

/// Record that `reviewer_id` reviewed `reviewee_id`.
///
/// Self-review is rejected before any other check.
pub fn assign_reviewer(agg: &mut Aggregate, reviewer_id: &str, reviewee_id: &str) -> Result<()> {
    if reviewer_id == reviewee_id {
        return Err(StudyError::SelfReview);
    }
    ASSIGN_REVIEWER.check(agg.study.current_stage, "assign a reviewer")?;

    let round = agg.round_mut()?;
    if round.member(reviewer_id).is_none() {
        return Err(StudyError::MemberNotFound(reviewer_id.to_string()));
    }
    round
        .member_mut(reviewee_id)?
        .add_reviewer(reviewee_id, reviewer_id)
}

pub fn record_reflection(agg: &mut Aggregate, member_id: &str) -> Result<()> {
    RECORD_REFLECTION.check(agg.study.current_stage, "write a reflection")?;
    if agg.study.reflection_channel_id.is_empty() {
        return Err(StudyError::Validation(
            "no reflection channel has been configured".into(),
        ));
    }

    agg.round_mut()?.member_mut(member_id)?.mark_reflection_sent()
}

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(StudyError::Validation(format!("{field} is required")));
    }
    Ok(())
}
