use std::sync::MutexGuard;

use chrono::{DateTime, Duration, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info, instrument};
use vitae_core::db::SharedConnection;
use vitae_core::lease::{self, Lease, LeaseTable};
use vitae_core::time;

use crate::error::{Result, SchedulerError};
use crate::types::{ReminderTarget, Task, TaskKind};

/// Tasks are due when `sleep_until` is NULL or has passed.
pub const TASKS_TABLE: LeaseTable = LeaseTable {
    name: "tasks",
    null_is_due: true,
};

const SELECT_TASK: &str = "SELECT id, type, user_id, job_id, venue_id, post_id, alert_id,
                                  sleep_until, interval, auto_remove, created_at, updated_at
                           FROM tasks";

/// A claimed document together with the lease that guards it.
#[derive(Debug, Clone)]
pub struct Claim<D> {
    pub lease: Lease,
    pub doc: D,
}

/// Durable store of reminder and alert tasks.
///
/// Cheap to clone; clones share the connection. Each method holds the lock
/// for one statement, so every mutation is atomic on its own.
#[derive(Clone)]
pub struct TaskStore {
    db: SharedConnection,
}

impl TaskStore {
    pub fn new(db: SharedConnection) -> Self {
        Self { db }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| SchedulerError::LockPoisoned)
    }

    /// One-shot reminder about `target`, due at `sleep_until`.
    #[instrument(skip(self))]
    pub fn create_reminder(
        &self,
        user_id: &str,
        target: &ReminderTarget,
        sleep_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Task> {
        let task = Task {
            id: uuid::Uuid::now_v7().to_string(),
            user_id: user_id.to_string(),
            kind: TaskKind::Reminder {
                target: target.clone(),
            },
            sleep_until: Some(sleep_until),
            interval: None,
            auto_remove: true,
            created_at: now,
            updated_at: now,
        };
        // Column name comes from a closed enum, never from input.
        let sql = format!(
            "INSERT INTO tasks (id, type, user_id, {col}, sleep_until, auto_remove,
                                created_at, updated_at)
             VALUES (?1, 'reminder', ?2, ?3, ?4, 1, ?5, ?5)",
            col = target.column(),
        );
        let conn = self.conn()?;
        conn.execute(
            &sql,
            rusqlite::params![
                task.id,
                user_id,
                target.id(),
                time::encode(sleep_until),
                time::encode(now),
            ],
        )?;
        info!(task_id = %task.id, user_id, "reminder scheduled");
        Ok(task)
    }

    /// Recurring task for an alert. It is due immediately so the first
    /// search runs on the next poll rather than a full interval later.
    #[instrument(skip(self))]
    pub fn create_alert_task(
        &self,
        user_id: &str,
        alert_id: &str,
        interval: &str,
        now: DateTime<Utc>,
    ) -> Result<Task> {
        crate::interval::parse(interval)?;
        let task = Task {
            id: uuid::Uuid::now_v7().to_string(),
            user_id: user_id.to_string(),
            kind: TaskKind::Alert {
                alert_id: alert_id.to_string(),
            },
            sleep_until: Some(now),
            interval: Some(interval.to_string()),
            auto_remove: false,
            created_at: now,
            updated_at: now,
        };
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO tasks (id, type, user_id, alert_id, sleep_until, interval, auto_remove,
                                created_at, updated_at)
             VALUES (?1, 'alert', ?2, ?3, ?4, ?5, 0, ?4, ?4)",
            rusqlite::params![task.id, user_id, alert_id, time::encode(now), interval],
        )?;
        info!(task_id = %task.id, alert_id, "alert task created");
        Ok(task)
    }

    pub fn get(&self, id: &str) -> Result<Option<Task>> {
        let conn = self.conn()?;
        get_task(&conn, id)
    }

    pub fn list_for_user(&self, user_id: &str) -> Result<Vec<Task>> {
        let conn = self.conn()?;
        let sql = format!("{SELECT_TASK} WHERE user_id = ?1 ORDER BY created_at, id");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([user_id], row_to_task)?;
        let tasks = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tasks)
    }

    /// Every task attached to an alert. Normally zero or one.
    pub fn find_for_alert(&self, alert_id: &str) -> Result<Vec<Task>> {
        let conn = self.conn()?;
        let sql = format!("{SELECT_TASK} WHERE alert_id = ?1 ORDER BY created_at, id");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([alert_id], row_to_task)?;
        let tasks = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tasks)
    }

    #[instrument(skip(self))]
    pub fn delete(&self, id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute("DELETE FROM tasks WHERE id = ?1", [id])?;
        if n > 0 {
            debug!(task_id = id, "task deleted");
        }
        Ok(n > 0)
    }

    #[instrument(skip(self))]
    pub fn delete_for_alert(&self, alert_id: &str) -> Result<usize> {
        let conn = self.conn()?;
        Ok(conn.execute("DELETE FROM tasks WHERE alert_id = ?1", [alert_id])?)
    }

    /// Claim the most overdue eligible task for `lease_for`.
    pub fn claim(&self, now: DateTime<Utc>, lease_for: Duration) -> Result<Option<Claim<Task>>> {
        let conn = self.conn()?;
        let Some(lease) = lease::claim_next(&conn, TASKS_TABLE, now, lease_for)? else {
            return Ok(None);
        };
        // Same lock, so nothing can delete the row in between.
        let doc = get_task(&conn, &lease.id)?.ok_or_else(|| SchedulerError::TaskNotFound {
            id: lease.id.clone(),
        })?;
        debug!(task_id = %lease.id, "task claimed");
        Ok(Some(Claim { lease, doc }))
    }

    /// Drop a claim and keep the task back until `retry_at`. Returns false
    /// when the task is gone or a newer claim owns it.
    pub fn release(&self, lease: &Lease, retry_at: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn()?;
        Ok(lease::release_claim(&conn, TASKS_TABLE, lease, retry_at)?)
    }

    /// Record a completed alert cycle: `updated_at` (the search cutoff)
    /// becomes `now` and the task sleeps until `next_wake`. Both move in
    /// one statement, and this is the only place the watermark is written.
    ///
    /// The watermark always moves forward by at least one millisecond, even
    /// when a cycle runs in the same millisecond the task was last written.
    /// Returns the watermark that was stored.
    #[instrument(skip(self))]
    pub fn advance_watermark(
        &self,
        id: &str,
        now: DateTime<Utc>,
        next_wake: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        let conn = self.conn()?;
        let current = conn
            .query_row("SELECT updated_at FROM tasks WHERE id = ?1", [id], |row| {
                time::column(row, 0)
            })
            .optional()?
            .ok_or_else(|| SchedulerError::TaskNotFound { id: id.to_string() })?;

        let watermark = now.max(current + Duration::milliseconds(1));
        conn.execute(
            "UPDATE tasks SET updated_at = ?2, sleep_until = ?3 WHERE id = ?1",
            rusqlite::params![id, time::encode(watermark), time::encode(next_wake)],
        )?;
        Ok(watermark)
    }
}

fn get_task(conn: &Connection, id: &str) -> Result<Option<Task>> {
    let sql = format!("{SELECT_TASK} WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], row_to_task).optional()?)
}

fn malformed(reason: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(1, Type::Text, reason.to_string().into())
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let type_name: String = row.get(1)?;
    let job_id: Option<String> = row.get(3)?;
    let venue_id: Option<String> = row.get(4)?;
    let post_id: Option<String> = row.get(5)?;
    let alert_id: Option<String> = row.get(6)?;

    let kind = match (type_name.as_str(), job_id, venue_id, post_id, alert_id) {
        ("reminder", Some(id), None, None, None) => TaskKind::Reminder {
            target: ReminderTarget::Job(id),
        },
        ("reminder", None, Some(id), None, None) => TaskKind::Reminder {
            target: ReminderTarget::Venue(id),
        },
        ("reminder", None, None, Some(id), None) => TaskKind::Reminder {
            target: ReminderTarget::Post(id),
        },
        ("alert", None, None, None, Some(alert_id)) => TaskKind::Alert { alert_id },
        _ => return Err(malformed("task must have exactly one target")),
    };

    Ok(Task {
        id: row.get(0)?,
        user_id: row.get(2)?,
        kind,
        sleep_until: time::column_opt(row, 7)?,
        interval: row.get(8)?,
        auto_remove: row.get(9)?,
        created_at: time::column(row, 10)?,
        updated_at: time::column(row, 11)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use vitae_content::{ContentStore, NewPost, PostKind};
    use vitae_users::{AlertDraft, AlertStore, AlertType, NewUser, UserStore};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 2, 12, 0, 0).unwrap()
    }

    struct Fixture {
        tasks: TaskStore,
        users: UserStore,
        alerts: AlertStore,
        content: ContentStore,
        db: SharedConnection,
    }

    fn fixture() -> Fixture {
        let conn = vitae_core::db::open_in_memory().unwrap();
        crate::init_all(&conn).unwrap();
        let db = vitae_core::db::shared(conn);
        Fixture {
            tasks: TaskStore::new(db.clone()),
            users: UserStore::new(db.clone()),
            alerts: AlertStore::new(db.clone()),
            content: ContentStore::new(db.clone()),
            db,
        }
    }

    fn post(f: &Fixture, kind: PostKind) -> String {
        f.content
            .insert(&NewPost::new(kind, "poster", "Saved item"), t0())
            .unwrap()
            .id
    }

    fn user(f: &Fixture) -> String {
        f.users
            .create(&NewUser::new("ada", "ada@example.com"), t0())
            .unwrap()
            .id
    }

    #[test]
    fn reminder_roundtrip() {
        let f = fixture();
        let uid = user(&f);
        let due = t0() + Duration::days(7);
        let task = f
            .tasks
            .create_reminder(&uid, &ReminderTarget::Venue(post(&f, PostKind::Venue)), due, t0())
            .unwrap();

        let loaded = f.tasks.get(&task.id).unwrap().unwrap();
        assert_eq!(loaded, task);
        assert!(loaded.auto_remove);
        assert!(loaded.interval.is_none());
    }

    #[test]
    fn alert_task_is_due_immediately() {
        let f = fixture();
        let uid = user(&f);
        let alert = f
            .alerts
            .insert(&uid, &AlertDraft::new(AlertType::Job, "rust"), t0())
            .unwrap();
        let task = f
            .tasks
            .create_alert_task(&uid, &alert.id, "0 8 * * *", t0())
            .unwrap();
        assert_eq!(task.sleep_until, Some(t0()));
        assert!(!task.auto_remove);

        let claim = f
            .tasks
            .claim(t0(), Duration::minutes(10))
            .unwrap()
            .expect("due at creation time");
        assert_eq!(claim.doc, task);
    }

    #[test]
    fn bad_interval_is_rejected_before_insert() {
        let f = fixture();
        let uid = user(&f);
        let alert = f
            .alerts
            .insert(&uid, &AlertDraft::new(AlertType::Job, "x"), t0())
            .unwrap();
        let err = f
            .tasks
            .create_alert_task(&uid, &alert.id, "every tuesday", t0())
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidInterval { .. }));
        assert!(f.tasks.find_for_alert(&alert.id).unwrap().is_empty());
    }

    #[test]
    fn check_constraint_rejects_ambiguous_targets() {
        let f = fixture();
        let uid = user(&f);
        let conn = f.db.lock().unwrap();
        let both = conn.execute(
            "INSERT INTO tasks (id, type, user_id, job_id, venue_id, created_at, updated_at)
             VALUES ('t1', 'reminder', ?1, 'j', 'v', 'x', 'x')",
            [&uid],
        );
        assert!(both.is_err());
        let neither = conn.execute(
            "INSERT INTO tasks (id, type, user_id, created_at, updated_at)
             VALUES ('t2', 'reminder', ?1, 'x', 'x')",
            [&uid],
        );
        assert!(neither.is_err());
    }

    #[test]
    fn null_sleep_until_is_eligible() {
        let f = fixture();
        let uid = user(&f);
        let task = f
            .tasks
            .create_reminder(&uid, &ReminderTarget::Job(post(&f, PostKind::Job)), t0(), t0())
            .unwrap();
        f.db.lock()
            .unwrap()
            .execute("UPDATE tasks SET sleep_until = NULL", [])
            .unwrap();
        let claim = f
            .tasks
            .claim(t0() - Duration::days(1), Duration::minutes(1))
            .unwrap()
            .unwrap();
        assert_eq!(claim.doc.id, task.id);
        assert!(claim.doc.sleep_until.is_none());
    }

    #[test]
    fn advance_watermark_moves_cutoff_and_wake_together() {
        let f = fixture();
        let uid = user(&f);
        let alert = f
            .alerts
            .insert(&uid, &AlertDraft::new(AlertType::Venue, "bars"), t0())
            .unwrap();
        let task = f
            .tasks
            .create_alert_task(&uid, &alert.id, "0 8 * * 1", t0())
            .unwrap();

        let now = t0() + Duration::minutes(3);
        let wake = t0() + Duration::days(6);
        assert_eq!(f.tasks.advance_watermark(&task.id, now, wake).unwrap(), now);
        let loaded = f.tasks.get(&task.id).unwrap().unwrap();
        assert_eq!(loaded.updated_at, now);
        assert_eq!(loaded.sleep_until, Some(wake));

        assert!(matches!(
            f.tasks.advance_watermark("gone", now, wake),
            Err(SchedulerError::TaskNotFound { .. })
        ));
    }

    #[test]
    fn deleting_alert_or_user_cascades_to_tasks() {
        let f = fixture();
        let uid = user(&f);
        let alert = f
            .alerts
            .insert(&uid, &AlertDraft::new(AlertType::Job, "a"), t0())
            .unwrap();
        f.tasks
            .create_alert_task(&uid, &alert.id, "0 8 * * *", t0())
            .unwrap();
        let blog = post(&f, PostKind::Blog);
        f.tasks
            .create_reminder(&uid, &ReminderTarget::Post(blog), t0(), t0())
            .unwrap();

        f.alerts.delete(&alert.id).unwrap();
        assert_eq!(f.tasks.list_for_user(&uid).unwrap().len(), 1);

        f.users.delete(&uid).unwrap();
        assert!(f.tasks.list_for_user(&uid).unwrap().is_empty());
    }

    #[test]
    fn watermark_strictly_increases_within_one_millisecond() {
        let f = fixture();
        let uid = user(&f);
        let alert = f
            .alerts
            .insert(&uid, &AlertDraft::new(AlertType::Job, "rust"), t0())
            .unwrap();
        let task = f
            .tasks
            .create_alert_task(&uid, &alert.id, "0 8 * * *", t0())
            .unwrap();
        let wake = t0() + Duration::days(1);

        let first = f.tasks.advance_watermark(&task.id, t0(), wake).unwrap();
        assert_eq!(first, t0() + Duration::milliseconds(1));
        let second = f.tasks.advance_watermark(&task.id, t0(), wake).unwrap();
        assert_eq!(second, t0() + Duration::milliseconds(2));
        assert_eq!(f.tasks.get(&task.id).unwrap().unwrap().updated_at, second);
    }

    #[test]
    fn deleting_the_item_cascades_to_its_reminders() {
        let f = fixture();
        let uid = user(&f);
        let job = post(&f, PostKind::Job);
        let other = post(&f, PostKind::Venue);
        let doomed = f
            .tasks
            .create_reminder(&uid, &ReminderTarget::Job(job.clone()), t0(), t0())
            .unwrap();
        let kept = f
            .tasks
            .create_reminder(&uid, &ReminderTarget::Venue(other), t0(), t0())
            .unwrap();

        assert!(f.content.delete(&job).unwrap());
        assert!(f.tasks.get(&doomed.id).unwrap().is_none());
        assert!(f.tasks.get(&kept.id).unwrap().is_some());
    }

    #[test]
    fn reminders_for_unknown_items_are_rejected() {
        let f = fixture();
        let uid = user(&f);
        let err = f
            .tasks
            .create_reminder(&uid, &ReminderTarget::Job("no-such-job".into()), t0(), t0())
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Database(_)));
        assert!(f.tasks.list_for_user(&uid).unwrap().is_empty());
    }
}
