use std::sync::MutexGuard;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension};
use tracing::{info, instrument};
use vitae_core::db::SharedConnection;
use vitae_core::types::DateWindow;
use vitae_core::{slug, time};

use crate::error::{Result, UserError};
use crate::types::{Alert, AlertDraft};

const SELECT_ALERT: &str = "SELECT id, user_id, alert_type, title, slug, keywords, location,
                                   types, regions, dates_start, dates_end, frequency,
                                   active, email, notification, task_id,
                                   created_at, updated_at
                            FROM alerts";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Saved alert definitions. The task back-reference is only written through
/// [`AlertStore::set_task`]; keeping it consistent with the tasks table is
/// the caller's job.
#[derive(Clone)]
pub struct AlertStore {
    db: SharedConnection,
}

impl AlertStore {
    pub fn new(db: SharedConnection) -> Self {
        Self { db }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| UserError::LockPoisoned)
    }

    #[instrument(skip(self, draft), fields(title = %draft.title))]
    pub fn insert(&self, user_id: &str, draft: &AlertDraft, now: DateTime<Utc>) -> Result<Alert> {
        let id = uuid::Uuid::now_v7().to_string();
        let slug = slug::generate(&draft.title);
        let types = serde_json::to_string(&draft.types)?;
        let regions = serde_json::to_string(&draft.regions)?;
        let (dates_start, dates_end) = encode_window(draft.dates);

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO alerts
                (id, user_id, alert_type, title, slug, keywords, location, types, regions,
                 dates_start, dates_end, frequency, active, email, notification,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?16)",
            rusqlite::params![
                id,
                user_id,
                draft.alert_type.to_string(),
                draft.title,
                slug,
                draft.keywords,
                draft.location,
                types,
                regions,
                dates_start,
                dates_end,
                draft.frequency.to_string(),
                draft.active,
                draft.email,
                draft.notification,
                time::encode(now),
            ],
        )?;
        info!(alert_id = %id, user_id, "alert saved");
        get_alert(&conn, &id)?.ok_or(UserError::AlertNotFound(id))
    }

    pub fn get(&self, id: &str) -> Result<Option<Alert>> {
        let conn = self.conn()?;
        get_alert(&conn, id)
    }

    pub fn get_by_slug(&self, slug: &str) -> Result<Option<Alert>> {
        let conn = self.conn()?;
        let sql = format!("{SELECT_ALERT} WHERE slug = ?1");
        Ok(conn.query_row(&sql, [slug], row_to_alert).optional()?)
    }

    /// All alerts of one user, newest first.
    pub fn list_for_user(&self, user_id: &str) -> Result<Vec<Alert>> {
        let conn = self.conn()?;
        let sql = format!("{SELECT_ALERT} WHERE user_id = ?1 ORDER BY created_at DESC, id DESC");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([user_id], row_to_alert)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Overwrite the editable fields. Slug, owner and task stay as they are.
    #[instrument(skip(self, draft))]
    pub fn update(&self, id: &str, draft: &AlertDraft, now: DateTime<Utc>) -> Result<Alert> {
        let types = serde_json::to_string(&draft.types)?;
        let regions = serde_json::to_string(&draft.regions)?;
        let (dates_start, dates_end) = encode_window(draft.dates);

        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE alerts SET
                alert_type = ?2, title = ?3, keywords = ?4, location = ?5, types = ?6,
                regions = ?7, dates_start = ?8, dates_end = ?9, frequency = ?10,
                active = ?11, email = ?12, notification = ?13, updated_at = ?14
             WHERE id = ?1",
            rusqlite::params![
                id,
                draft.alert_type.to_string(),
                draft.title,
                draft.keywords,
                draft.location,
                types,
                regions,
                dates_start,
                dates_end,
                draft.frequency.to_string(),
                draft.active,
                draft.email,
                draft.notification,
                time::encode(now),
            ],
        )?;
        if n == 0 {
            return Err(UserError::AlertNotFound(id.to_string()));
        }
        get_alert(&conn, id)?.ok_or_else(|| UserError::AlertNotFound(id.to_string()))
    }

    pub fn set_active(&self, id: &str, active: bool, now: DateTime<Utc>) -> Result<()> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE alerts SET active = ?2, updated_at = ?3 WHERE id = ?1",
            rusqlite::params![id, active, time::encode(now)],
        )?;
        if n == 0 {
            return Err(UserError::AlertNotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn set_task(&self, id: &str, task_id: Option<&str>) -> Result<()> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE alerts SET task_id = ?2 WHERE id = ?1",
            rusqlite::params![id, task_id],
        )?;
        if n == 0 {
            return Err(UserError::AlertNotFound(id.to_string()));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn delete(&self, id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute("DELETE FROM alerts WHERE id = ?1", [id])?;
        Ok(n > 0)
    }
}

fn encode_window(dates: Option<DateWindow>) -> (Option<String>, Option<String>) {
    match dates {
        Some(w) => (
            Some(w.start.format(DATE_FORMAT).to_string()),
            Some(w.end.format(DATE_FORMAT).to_string()),
        ),
        None => (None, None),
    }
}

fn get_alert(conn: &Connection, id: &str) -> Result<Option<Alert>> {
    let sql = format!("{SELECT_ALERT} WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], row_to_alert).optional()?)
}

fn conversion<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn json_list(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion(idx, e))
}

fn date(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(|e| conversion(idx, e)))
        .transpose()
}

/// Parse a text enum column through its `FromStr`.
fn parsed<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into())
    })
}

fn row_to_alert(row: &rusqlite::Row<'_>) -> rusqlite::Result<Alert> {
    let dates = match (date(row, 9)?, date(row, 10)?) {
        (Some(start), Some(end)) => Some(DateWindow::new(start, end)),
        _ => None,
    };
    Ok(Alert {
        id: row.get(0)?,
        user_id: row.get(1)?,
        alert_type: parsed(row, 2)?,
        title: row.get(3)?,
        slug: row.get(4)?,
        keywords: row.get(5)?,
        location: row.get(6)?,
        types: json_list(row, 7)?,
        regions: json_list(row, 8)?,
        dates,
        frequency: parsed(row, 11)?,
        active: row.get(12)?,
        email: row.get(13)?,
        notification: row.get(14)?,
        task_id: row.get(15)?,
        created_at: time::column(row, 16)?,
        updated_at: time::column(row, 17)?,
    })
}
