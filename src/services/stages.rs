//! Study creation and stage progression.

use tokio::time::Instant;
use tracing::{info, instrument};

use super::{require_manager, RequestContext, StudyService, StudyUpdate};
use crate::bus::{StudyEvent, Topic};
use crate::error::{Result, StudyError};
use crate::machine::{self, StageCommand, Transition};
use crate::model::Study;

impl StudyService {
    /// Create the study for `ctx.group_id`. The caller becomes its manager.
    #[instrument(skip_all, fields(group_id = %ctx.group_id, actor_id = %ctx.actor_id))]
    pub async fn create_study(&self, ctx: &RequestContext) -> Result<StudyUpdate> {
        if ctx.group_id.trim().is_empty() {
            return Err(StudyError::Validation("group id is required".into()));
        }

        let started = Instant::now();
        let lock = self.locks.lock_for(&ctx.group_id);
        let guard = tokio::time::timeout(ctx.timeout, lock.lock_owned())
            .await
            .map_err(|_| StudyError::Timeout(ctx.timeout))?;
        let remaining = ctx.timeout.saturating_sub(started.elapsed());
        let study = self
            .executor
            .create(remaining, Study::new(ctx.group_id.as_str(), ctx.actor_id.as_str()))
            .await?;
        drop(guard);

        info!(study_id = %study.id, "Study created");
        self.publish(
            StudyEvent::new(Topic::StudyCreated, &study, ctx.actor_id.as_str())
                .with_description(format!("managed by {}", study.manager_id)),
        );

        Ok(StudyUpdate { study, round: None })
    }

    /// Start a new round titled `title` and open speaker registration.
    #[instrument(skip_all, fields(group_id = %ctx.group_id, actor_id = %ctx.actor_id))]
    pub async fn open_registration(&self, ctx: &RequestContext, title: &str) -> Result<StudyUpdate> {
        let actor_id = ctx.actor_id.as_str();
        let committed = self
            .mutate(ctx, |mut agg| {
                require_manager(&agg.study, actor_id, StageCommand::OpenRegistration.action())?;
                let transition = machine::open_registration(&mut agg, title)?;
                Ok((agg, transition))
            })
            .await?;

        let update = StudyUpdate::from(committed.aggregate);
        self.announce_transition(ctx, &update, committed.value);
        Ok(update)
    }

    pub async fn close_registration(&self, ctx: &RequestContext) -> Result<StudyUpdate> {
        self.advance_stage(ctx, StageCommand::CloseRegistration).await
    }

    pub async fn open_submission(&self, ctx: &RequestContext) -> Result<StudyUpdate> {
        self.advance_stage(ctx, StageCommand::OpenSubmission).await
    }

    pub async fn close_submission(&self, ctx: &RequestContext) -> Result<StudyUpdate> {
        self.advance_stage(ctx, StageCommand::CloseSubmission).await
    }

    pub async fn start_presentation(&self, ctx: &RequestContext) -> Result<StudyUpdate> {
        self.advance_stage(ctx, StageCommand::StartPresentation).await
    }

    pub async fn finish_presentation(&self, ctx: &RequestContext) -> Result<StudyUpdate> {
        self.advance_stage(ctx, StageCommand::FinishPresentation).await
    }

    pub async fn open_review(&self, ctx: &RequestContext) -> Result<StudyUpdate> {
        self.advance_stage(ctx, StageCommand::OpenReview).await
    }

    pub async fn close_review(&self, ctx: &RequestContext) -> Result<StudyUpdate> {
        self.advance_stage(ctx, StageCommand::CloseReview).await
    }

    /// Finish the round. The study returns to `Wait` and the round is frozen.
    pub async fn finalize_cycle(&self, ctx: &RequestContext) -> Result<StudyUpdate> {
        self.advance_stage(ctx, StageCommand::Finalize).await
    }

    #[instrument(skip(self, ctx), fields(group_id = %ctx.group_id, actor_id = %ctx.actor_id))]
    async fn advance_stage(&self, ctx: &RequestContext, command: StageCommand) -> Result<StudyUpdate> {
        let actor_id = ctx.actor_id.as_str();
        let committed = self
            .mutate(ctx, |mut agg| {
                require_manager(&agg.study, actor_id, command.action())?;
                let transition = machine::apply(&mut agg, command)?;
                Ok((agg, transition))
            })
            .await?;

        let update = StudyUpdate::from(committed.aggregate);
        self.announce_transition(ctx, &update, committed.value);
        Ok(update)
    }

    fn announce_transition(&self, ctx: &RequestContext, update: &StudyUpdate, transition: Transition) {
        let round_id = update
            .round
            .as_ref()
            .map(|r| r.id.clone())
            .unwrap_or_default();

        info!(
            from = %transition.from.as_str(),
            to = %transition.to.as_str(),
            %round_id,
            "Stage advanced"
        );

        let topic = if transition.finished_round() {
            Topic::RoundFinished
        } else {
            Topic::StageChanged
        };
        self.publish(
            StudyEvent::new(topic, &update.study, ctx.actor_id.as_str())
                .with_round(round_id)
                .with_stage(transition.to)
                .with_description(transition.to.label()),
        );
    }
}
