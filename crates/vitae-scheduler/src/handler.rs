//! What a claimed task actually does.
//!
//! Load, act, persist, strictly in that order. Nothing is written unless the
//! action succeeded, so an error leaves the task exactly as it was and the
//! next claim retries from the same watermark.
//!
//! An alert cycle counts as seen once any channel delivered it. Only a cycle
//! where every attempted channel failed is retried, so a channel that went
//! through is never repeated for the same window.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{info, instrument, warn};
use vitae_content::{ContentSearch, ContentStore, PostKind, SearchCriteria, SearchHit};
use vitae_core::config::{SiteConfig, WatermarkPolicy};
use vitae_core::db::SharedConnection;
use vitae_notify::{EmailMessage, EmailSender, NotifyError, PushPayload, PushSender};
use vitae_users::{Alert, AlertStore, AlertType, User, UserStore};

use crate::error::{Result, SchedulerError};
use crate::interval;
use crate::poller::{Disposition, DocumentHandler};
use crate::store::TaskStore;
use crate::types::{Entity, Outcome, ReminderTarget, SkipReason, Task, TaskKind};

pub const REMINDER_TEMPLATE: &str = "reminder";
pub const DIGEST_TEMPLATE: &str = "posts";

/// Every store the scheduler touches, sharing one connection.
#[derive(Clone)]
pub struct Stores {
    pub tasks: TaskStore,
    pub users: UserStore,
    pub alerts: AlertStore,
    pub content: ContentStore,
}

impl Stores {
    pub fn new(db: SharedConnection) -> Self {
        Self {
            tasks: TaskStore::new(db.clone()),
            users: UserStore::new(db.clone()),
            alerts: AlertStore::new(db.clone()),
            content: ContentStore::new(db),
        }
    }
}

pub struct TaskHandler {
    stores: Stores,
    email: Arc<dyn EmailSender>,
    push: Arc<dyn PushSender>,
    site: SiteConfig,
    watermark: WatermarkPolicy,
}

/// Tally of one alert cycle's notifications.
#[derive(Debug, Default)]
struct Dispatch {
    attempted: usize,
    delivered: usize,
    failed: usize,
}

impl TaskHandler {
    pub fn new(
        stores: Stores,
        email: Arc<dyn EmailSender>,
        push: Arc<dyn PushSender>,
        site: SiteConfig,
        watermark: WatermarkPolicy,
    ) -> Self {
        Self {
            stores,
            email,
            push,
            site,
            watermark,
        }
    }

    /// Run one task to completion.
    ///
    /// Missing entities are not errors: the task is skipped untouched and
    /// left for cascading deletes to clean up.
    #[instrument(skip(self), fields(task_type = tracing::field::Empty))]
    pub async fn handle(&self, task_id: &str, now: DateTime<Utc>) -> Result<Outcome> {
        let Some(task) = self.stores.tasks.get(task_id)? else {
            return Ok(skip_missing(task_id, Entity::Task));
        };
        tracing::Span::current().record("task_type", task.kind.type_name());

        let Some(user) = self.stores.users.get(&task.user_id)? else {
            return Ok(skip_missing(task_id, Entity::User));
        };

        match &task.kind {
            TaskKind::Reminder { target } => self.remind(&task, &user, target).await,
            TaskKind::Alert { alert_id } => self.check_alert(&task, &user, alert_id, now).await,
        }
    }

    async fn remind(&self, task: &Task, user: &User, target: &ReminderTarget) -> Result<Outcome> {
        let Some(post) = self.stores.content.get(target.id())? else {
            return Ok(skip_missing(&task.id, Entity::Item));
        };

        let msg = self
            .message(REMINDER_TEMPLATE, user)
            .var(
                "post",
                json!({
                    "id": post.id,
                    "title": post.title,
                    "slug": post.slug,
                    "kind": post.kind,
                }),
            )
            .var("location", post.location_name.as_str());
        self.email.send(&msg).await?;

        self.stores.tasks.delete(&task.id)?;
        info!(task_id = %task.id, user_id = %user.id, post_id = %post.id, "reminder sent");
        Ok(Outcome::Deleted)
    }

    async fn check_alert(
        &self,
        task: &Task,
        user: &User,
        alert_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Outcome> {
        let Some(alert) = self.stores.alerts.get(alert_id)? else {
            return Ok(skip_missing(&task.id, Entity::Alert));
        };
        if !alert.active {
            warn!(task_id = %task.id, alert_id, "alert inactive; task left for cleanup");
            return Ok(Outcome::Skipped(SkipReason::AlertInactive));
        }

        // Resolve the next wake-up first so a broken interval fails before
        // anything is sent.
        let expr = task
            .interval
            .as_deref()
            .unwrap_or_else(|| alert.frequency.interval());
        let next_wake = interval::next_after(expr, now)?;

        let hits = self.stores.content.search(&criteria(&alert, task.updated_at))?;
        let matches = hits.len();

        let dispatch = if hits.is_empty() {
            Dispatch::default()
        } else {
            self.notify(user, &alert, &hits).await?
        };

        if dispatch.failed > 0 {
            match self.watermark {
                WatermarkPolicy::AfterDispatch if dispatch.delivered == 0 => {
                    return Err(SchedulerError::DispatchFailed {
                        task_id: task.id.clone(),
                        attempted: dispatch.attempted,
                        failed: dispatch.failed,
                    });
                }
                WatermarkPolicy::AfterDispatch => warn!(
                    task_id = %task.id,
                    delivered = dispatch.delivered,
                    failed = dispatch.failed,
                    "partial dispatch; cycle marked seen"
                ),
                WatermarkPolicy::Always => warn!(
                    task_id = %task.id,
                    failed = dispatch.failed,
                    "dispatch failed; advancing watermark anyway"
                ),
            }
        }

        let watermark = self.stores.tasks.advance_watermark(&task.id, now, next_wake)?;
        info!(task_id = %task.id, alert_id, matches, %watermark, %next_wake, "alert cycle complete");
        Ok(Outcome::Advanced { matches, next_wake })
    }

    /// Send push and/or email for a non-empty result set. Individual sends
    /// are counted as delivered or failed, not returned; storage errors are.
    async fn notify(&self, user: &User, alert: &Alert, hits: &[SearchHit]) -> Result<Dispatch> {
        let mut dispatch = Dispatch::default();

        if alert.notification {
            if let Some(sub) = &user.push_subscription {
                dispatch.attempted += 1;
                let payload = self.push_payload(alert, hits.len());
                match self.push.push(sub, &payload).await {
                    Ok(()) => dispatch.delivered += 1,
                    Err(NotifyError::SubscriptionGone { status }) => {
                        info!(user_id = %user.id, status, "push subscription gone; clearing it");
                        self.stores.users.clear_push_subscription(&user.id)?;
                    }
                    Err(e) => {
                        warn!(user_id = %user.id, alert_id = %alert.id, error = %e, "push failed");
                        dispatch.failed += 1;
                    }
                }
            }
        }

        if alert.email {
            dispatch.attempted += 1;
            let msg = self
                .message(DIGEST_TEMPLATE, user)
                .var("posts", serde_json::to_value(hits)?)
                .var("type", alert.alert_type.to_string())
                .var("alert", serde_json::to_value(alert)?);
            match self.email.send(&msg).await {
                Ok(()) => dispatch.delivered += 1,
                Err(e) => {
                    warn!(user_id = %user.id, alert_id = %alert.id, error = %e, "digest email failed");
                    dispatch.failed += 1;
                }
            }
        }

        Ok(dispatch)
    }

    fn message(&self, template: &str, user: &User) -> EmailMessage {
        EmailMessage::new(template, self.site.from_header(), user.email.as_str())
            .var("sitename", self.site.name.as_str())
            .var("hostname", self.site.hostname.as_str())
            .var("username", user.username.as_str())
    }

    fn push_payload(&self, alert: &Alert, count: usize) -> PushPayload {
        let site = &self.site.name;
        let host = &self.site.hostname;
        let kind = alert.alert_type;
        PushPayload {
            title: format!("{count} New {kind}s found @ {site}"),
            image: format!("{host}/favicon.svg"),
            url: format!("{host}/alert/{}", alert.slug),
            text: format!(
                "There are {count} new {kind}s at {site} matching your alert \"{}\"",
                alert.title
            ),
        }
    }
}

/// Search criteria for one alert cycle.
pub fn criteria(alert: &Alert, cutoff: DateTime<Utc>) -> SearchCriteria {
    SearchCriteria {
        kind: match alert.alert_type {
            AlertType::Job => PostKind::Job,
            AlertType::Venue => PostKind::Venue,
        },
        keywords: alert.keywords.clone(),
        types: alert.types.clone(),
        regions: alert.regions.clone(),
        location: alert.location.clone(),
        dates: alert.dates,
        cutoff,
    }
}

fn skip_missing(task_id: &str, entity: Entity) -> Outcome {
    warn!(task_id, %entity, "referenced entity missing; skipping task");
    Outcome::Skipped(SkipReason::MissingEntity(entity))
}

#[async_trait]
impl DocumentHandler<Task> for TaskHandler {
    async fn process(&self, task: Task, now: DateTime<Utc>) -> Result<Disposition> {
        match self.handle(&task.id, now).await? {
            Outcome::Deleted => Ok(Disposition::Removed),
            Outcome::Advanced { .. } | Outcome::Skipped(_) => Ok(Disposition::Retained),
        }
    }
}
