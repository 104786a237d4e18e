//! Study-level settings. Allowed in any stage, manager only.

use tracing::{info, instrument};

use super::{require_manager, RequestContext, StudyService, StudyUpdate};
use crate::bus::{StudyEvent, Topic};
use crate::error::{Result, StudyError};
use crate::model::Study;

/// Which setting a call changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Setting {
    NoticeChannel,
    ReflectionChannel,
    Manager,
    ReportUrl,
}

impl Setting {
    fn field(self) -> &'static str {
        match self {
            Setting::NoticeChannel => "notice channel",
            Setting::ReflectionChannel => "reflection channel",
            Setting::Manager => "manager",
            Setting::ReportUrl => "report url",
        }
    }

    fn action(self) -> &'static str {
        match self {
            Setting::NoticeChannel => "change the notice channel",
            Setting::ReflectionChannel => "change the reflection channel",
            Setting::Manager => "hand over the study",
            Setting::ReportUrl => "change the report link",
        }
    }

    fn write(self, study: &mut Study, value: &str) {
        match self {
            Setting::NoticeChannel => study.set_notice_channel_id(value),
            Setting::ReflectionChannel => study.set_reflection_channel_id(value),
            Setting::Manager => study.set_manager_id(value),
            Setting::ReportUrl => study.set_report_url(value),
        }
    }
}

impl StudyService {
    /// Channel that receives stage announcements.
    pub async fn set_notice_channel(
        &self,
        ctx: &RequestContext,
        channel_id: &str,
    ) -> Result<StudyUpdate> {
        self.update_setting(ctx, Setting::NoticeChannel, channel_id)
            .await
    }

    /// Channel members post their reflections in.
    pub async fn set_reflection_channel(
        &self,
        ctx: &RequestContext,
        channel_id: &str,
    ) -> Result<StudyUpdate> {
        self.update_setting(ctx, Setting::ReflectionChannel, channel_id)
            .await
    }

    /// Hand the study over. The previous manager loses every manager right.
    pub async fn set_manager(&self, ctx: &RequestContext, manager_id: &str) -> Result<StudyUpdate> {
        self.update_setting(ctx, Setting::Manager, manager_id).await
    }

    pub async fn set_report_url(&self, ctx: &RequestContext, url: &str) -> Result<StudyUpdate> {
        self.update_setting(ctx, Setting::ReportUrl, url).await
    }

    #[instrument(skip(self, ctx, value), fields(group_id = %ctx.group_id, actor_id = %ctx.actor_id))]
    async fn update_setting(
        &self,
        ctx: &RequestContext,
        setting: Setting,
        value: &str,
    ) -> Result<StudyUpdate> {
        let value = value.trim();
        if value.is_empty() {
            return Err(StudyError::Validation(format!(
                "{} is required",
                setting.field()
            )));
        }

        let actor_id = ctx.actor_id.as_str();
        let committed = self
            .mutate(ctx, |mut agg| {
                require_manager(&agg.study, actor_id, setting.action())?;
                setting.write(&mut agg.study, value);
                Ok((agg, ()))
            })
            .await?;

        info!(setting = setting.field(), "Study setting updated");
        self.publish(
            StudyEvent::new(Topic::SettingsUpdated, &committed.aggregate.study, actor_id)
                .with_description(format!("{}: {value}", setting.field())),
        );
        Ok(committed.aggregate.into())
    }
}
