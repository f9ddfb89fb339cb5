//! Keeps alerts and reminder tasks consistent with the tasks table.
//!
//! An active alert owns exactly one task. Any change that (re)activates an
//! alert deletes whatever task it had and creates a fresh one that is due
//! immediately; deactivation just deletes it.

use chrono::{DateTime, Duration, Utc};
use tracing::{info, instrument};
use vitae_users::{Alert, AlertDraft};

use crate::error::{Result, SchedulerError};
use crate::handler::Stores;
use crate::types::{ReminderTarget, Task};

#[derive(Clone)]
pub struct AlertLifecycle {
    stores: Stores,
}

impl AlertLifecycle {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    /// Save a new alert, scheduling it right away when active.
    #[instrument(skip(self, draft), fields(title = %draft.title))]
    pub fn create(&self, user_id: &str, draft: &AlertDraft, now: DateTime<Utc>) -> Result<Alert> {
        let alert = self.stores.alerts.insert(user_id, draft, now)?;
        self.sync_task(&alert, now)
    }

    /// Replace the alert's criteria. An active alert restarts with a new task
    /// (and a fresh watermark).
    #[instrument(skip(self, draft))]
    pub fn update(&self, alert_id: &str, draft: &AlertDraft, now: DateTime<Utc>) -> Result<Alert> {
        let alert = self.stores.alerts.update(alert_id, draft, now)?;
        self.sync_task(&alert, now)
    }

    #[instrument(skip(self))]
    pub fn set_active(&self, alert_id: &str, active: bool, now: DateTime<Utc>) -> Result<Alert> {
        self.stores.alerts.set_active(alert_id, active, now)?;
        let alert = self.load(alert_id)?;
        self.sync_task(&alert, now)
    }

    pub fn toggle(&self, alert_id: &str, now: DateTime<Utc>) -> Result<Alert> {
        let alert = self.load(alert_id)?;
        self.set_active(alert_id, !alert.active, now)
    }

    /// Remove the alert and its task.
    #[instrument(skip(self))]
    pub fn delete(&self, alert_id: &str) -> Result<bool> {
        self.stores.tasks.delete_for_alert(alert_id)?;
        let deleted = self.stores.alerts.delete(alert_id)?;
        if deleted {
            info!(alert_id, "alert deleted");
        }
        Ok(deleted)
    }

    fn load(&self, alert_id: &str) -> Result<Alert> {
        self.stores
            .alerts
            .get(alert_id)?
            .ok_or_else(|| SchedulerError::AlertNotFound {
                id: alert_id.to_string(),
            })
    }

    fn sync_task(&self, alert: &Alert, now: DateTime<Utc>) -> Result<Alert> {
        let removed = self.stores.tasks.delete_for_alert(&alert.id)?;
        let task_id = if alert.active {
            let task = self.stores.tasks.create_alert_task(
                &alert.user_id,
                &alert.id,
                alert.frequency.interval(),
                now,
            )?;
            Some(task.id)
        } else {
            None
        };
        self.stores.alerts.set_task(&alert.id, task_id.as_deref())?;
        info!(
            alert_id = %alert.id,
            active = alert.active,
            removed,
            task_id = task_id.as_deref().unwrap_or(""),
            "alert schedule synced"
        );
        self.load(&alert.id)
    }
}

/// Schedules and cancels one-shot reminders about saved items.
#[derive(Clone)]
pub struct ReminderLifecycle {
    stores: Stores,
    delay: Duration,
}

impl ReminderLifecycle {
    pub fn new(stores: Stores, delay_days: u32) -> Self {
        Self {
            stores,
            delay: Duration::days(i64::from(delay_days)),
        }
    }

    /// Remind `user_id` about `target` once the configured delay has passed.
    pub fn remind(&self, user_id: &str, target: &ReminderTarget, now: DateTime<Utc>) -> Result<Task> {
        self.stores
            .tasks
            .create_reminder(user_id, target, now + self.delay, now)
    }

    pub fn cancel(&self, task_id: &str) -> Result<bool> {
        self.stores.tasks.delete(task_id)
    }
}
