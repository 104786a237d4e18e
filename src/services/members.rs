//! Per-participant operations on the ongoing round.

use tracing::{info, instrument};

use super::{require_manager, RequestContext, StudyService, StudyUpdate};
use crate::bus::{StudyEvent, Topic};
use crate::error::Result;
use crate::machine;
use crate::model::Aggregate;

impl StudyService {
    /// Register the caller as a speaker of the ongoing round.
    #[instrument(skip_all, fields(group_id = %ctx.group_id, actor_id = %ctx.actor_id))]
    pub async fn register_member(
        &self,
        ctx: &RequestContext,
        name: &str,
        subject: &str,
    ) -> Result<StudyUpdate> {
        let member_id = ctx.actor_id.as_str();
        let committed = self
            .mutate(ctx, |mut agg| {
                machine::register_member(&mut agg, member_id, name, subject)?;
                Ok((agg, ()))
            })
            .await?;

        info!("Member registered");
        self.announce(
            ctx,
            &committed.aggregate,
            Topic::MemberRegistered,
            format!("{member_id} will present \"{}\"", subject.trim()),
        );
        Ok(committed.aggregate.into())
    }

    /// Withdraw `member_id`'s registration. Members may withdraw themselves;
    /// anyone else needs to be the manager.
    #[instrument(skip_all, fields(group_id = %ctx.group_id, actor_id = %ctx.actor_id, %member_id))]
    pub async fn unregister_member(
        &self,
        ctx: &RequestContext,
        member_id: &str,
    ) -> Result<StudyUpdate> {
        let actor_id = ctx.actor_id.as_str();
        let committed = self
            .mutate(ctx, |mut agg| {
                if member_id != actor_id {
                    require_manager(&agg.study, actor_id, "cancel another member's registration")?;
                }
                machine::unregister_member(&mut agg, member_id)?;
                Ok((agg, ()))
            })
            .await?;

        info!("Member unregistered");
        self.announce(
            ctx,
            &committed.aggregate,
            Topic::MemberUnregistered,
            member_id.to_string(),
        );
        Ok(committed.aggregate.into())
    }

    /// Attach the caller's presentation material.
    #[instrument(skip_all, fields(group_id = %ctx.group_id, actor_id = %ctx.actor_id))]
    pub async fn submit_content(&self, ctx: &RequestContext, url: &str) -> Result<StudyUpdate> {
        let member_id = ctx.actor_id.as_str();
        let committed = self
            .mutate(ctx, |mut agg| {
                machine::submit_content(&mut agg, member_id, url)?;
                Ok((agg, ()))
            })
            .await?;

        self.announce(
            ctx,
            &committed.aggregate,
            Topic::ContentSubmitted,
            url.trim().to_string(),
        );
        Ok(committed.aggregate.into())
    }

    #[instrument(skip_all, fields(group_id = %ctx.group_id, actor_id = %ctx.actor_id, %member_id, attended))]
    pub async fn mark_attendance(
        &self,
        ctx: &RequestContext,
        member_id: &str,
        attended: bool,
    ) -> Result<StudyUpdate> {
        let actor_id = ctx.actor_id.as_str();
        let committed = self
            .mutate(ctx, |mut agg| {
                require_manager(&agg.study, actor_id, "check speaker attendance")?;
                machine::mark_attendance(&mut agg, member_id, attended)?;
                Ok((agg, ()))
            })
            .await?;

        self.announce(
            ctx,
            &committed.aggregate,
            Topic::AttendanceMarked,
            format!("{member_id} attended: {attended}"),
        );
        Ok(committed.aggregate.into())
    }

    /// Record the round-level result material.
    #[instrument(skip_all, fields(group_id = %ctx.group_id, actor_id = %ctx.actor_id))]
    pub async fn submit_round_content(
        &self,
        ctx: &RequestContext,
        url: &str,
    ) -> Result<StudyUpdate> {
        let actor_id = ctx.actor_id.as_str();
        let committed = self
            .mutate(ctx, |mut agg| {
                require_manager(&agg.study, actor_id, "register the round material")?;
                machine::submit_round_content(&mut agg, url)?;
                Ok((agg, ()))
            })
            .await?;

        self.announce(
            ctx,
            &committed.aggregate,
            Topic::RoundContentSubmitted,
            url.trim().to_string(),
        );
        Ok(committed.aggregate.into())
    }

    #[instrument(skip_all, fields(group_id = %ctx.group_id, actor_id = %ctx.actor_id, %reviewer_id, %reviewee_id))]
    pub async fn assign_reviewer(
        &self,
        ctx: &RequestContext,
        reviewer_id: &str,
        reviewee_id: &str,
    ) -> Result<StudyUpdate> {
        let committed = self
            .mutate(ctx, |mut agg| {
                machine::assign_reviewer(&mut agg, reviewer_id, reviewee_id)?;
                Ok((agg, ()))
            })
            .await?;

        self.announce(
            ctx,
            &committed.aggregate,
            Topic::ReviewerAssigned,
            format!("{reviewer_id} reviewed {reviewee_id}"),
        );
        Ok(committed.aggregate.into())
    }

    /// Mark the caller's reflection as sent. The returned study carries the
    /// reflection channel the text belongs in.
    #[instrument(skip_all, fields(group_id = %ctx.group_id, actor_id = %ctx.actor_id))]
    pub async fn record_reflection(&self, ctx: &RequestContext) -> Result<StudyUpdate> {
        let member_id = ctx.actor_id.as_str();
        let committed = self
            .mutate(ctx, |mut agg| {
                machine::record_reflection(&mut agg, member_id)?;
                Ok((agg, ()))
            })
            .await?;

        self.announce(
            ctx,
            &committed.aggregate,
            Topic::ReflectionSent,
            committed.aggregate.study.reflection_channel_id.clone(),
        );
        Ok(committed.aggregate.into())
    }

    fn announce(&self, ctx: &RequestContext, agg: &Aggregate, topic: Topic, description: String) {
        let mut event = StudyEvent::new(topic, &agg.study, ctx.actor_id.as_str())
            .with_description(description);
        if let Some(round) = &agg.round {
            event = event.with_round(round.id.as_str());
        }
        self.publish(event);
    }
}
