use std::sync::MutexGuard;

use chrono::{DateTime, Duration, Months, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info, instrument};
use vitae_core::db::SharedConnection;
use vitae_core::lease::{self, Lease, LeaseTable};
use vitae_core::{slug, time};

use crate::error::{ContentError, Result};
use crate::types::{NewPost, Post, PostKind, PostStatus};

/// Job listings go inactive this long after publishing.
pub const JOB_LIFETIME_MONTHS: u32 = 2;

/// Polled by the listing-expiry reaper. Only published jobs carry a
/// `sleep_until`.
pub const POSTS_TABLE: LeaseTable = LeaseTable {
    name: "posts",
    null_is_due: false,
};

pub(crate) const POST_COLUMNS: &str = "p.id, p.kind, p.parent_id, p.user_id, p.title, p.slug, p.body,
     p.location_name, p.country_name, p.types, p.regions, p.tags, p.status, p.featured,
     p.image, p.dates_start, p.dates_end, p.published_at, p.sleep_until,
     p.created_at, p.updated_at";

/// Number of columns in [`POST_COLUMNS`]; search reads the parent summary
/// from the columns that follow.
pub(crate) const POST_COLUMN_COUNT: usize = 21;

/// Posts plus their FTS5 index. Every write that touches indexed text goes
/// through here so the external-content index never drifts.
#[derive(Clone)]
pub struct ContentStore {
    pub(crate) db: SharedConnection,
}

impl ContentStore {
    pub fn new(db: SharedConnection) -> Self {
        Self { db }
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| ContentError::LockPoisoned)
    }

    /// Store a new draft and index its text.
    #[instrument(skip(self, new), fields(kind = %new.kind))]
    pub fn insert(&self, new: &NewPost, now: DateTime<Utc>) -> Result<Post> {
        let id = uuid::Uuid::now_v7().to_string();
        let slug = slug::generate(&new.title);
        let types = serde_json::to_string(&new.types)?;
        let regions = serde_json::to_string(&new.regions)?;
        let tags = serde_json::to_string(&new.tags)?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO posts
                (id, kind, parent_id, user_id, title, slug, body, location_name, country_name,
                 types, regions, tags, status, featured, image, dates_start, dates_end,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 'draft', ?13, ?14,
                     ?15, ?16, ?17, ?17)",
            rusqlite::params![
                id,
                new.kind.to_string(),
                new.parent_id,
                new.user_id,
                new.title,
                slug,
                new.body,
                new.location_name,
                new.country_name,
                types,
                regions,
                tags,
                new.featured,
                new.image,
                new.dates_start.map(time::encode),
                new.dates_end.map(time::encode),
                time::encode(now),
            ],
        )?;
        let seq = conn.last_insert_rowid();
        conn.execute(
            "INSERT INTO posts_fts(rowid, title, body, tags, location_name, country_name, types, regions)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                seq,
                new.title,
                new.body,
                tags,
                new.location_name,
                new.country_name,
                types,
                regions,
            ],
        )?;
        debug!(post_id = %id, seq, "post indexed");
        get_post(&conn, &id)?.ok_or(ContentError::NotFound(id))
    }

    /// Make the post visible to searches from `now` on. Jobs are scheduled
    /// to go inactive [`JOB_LIFETIME_MONTHS`] later.
    #[instrument(skip(self))]
    pub fn publish(&self, id: &str, now: DateTime<Utc>) -> Result<Post> {
        let conn = self.conn()?;
        let kind: Option<String> = conn
            .query_row("SELECT kind FROM posts WHERE id = ?1", [id], |row| row.get(0))
            .optional()?;
        let Some(kind) = kind else {
            return Err(ContentError::NotFound(id.to_string()));
        };

        let sleep_until = if kind == PostKind::Job.to_string() {
            now.checked_add_months(Months::new(JOB_LIFETIME_MONTHS))
                .map(time::encode)
        } else {
            None
        };
        conn.execute(
            "UPDATE posts SET status = 'published', published_at = ?2, sleep_until = ?3,
                              updated_at = ?2
             WHERE id = ?1",
            rusqlite::params![id, time::encode(now), sleep_until],
        )?;
        info!(post_id = id, kind = %kind, "post published");
        get_post(&conn, id)?.ok_or_else(|| ContentError::NotFound(id.to_string()))
    }

    pub fn get(&self, id: &str) -> Result<Option<Post>> {
        let conn = self.conn()?;
        get_post(&conn, id)
    }

    pub fn set_status(&self, id: &str, status: PostStatus, now: DateTime<Utc>) -> Result<()> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE posts SET status = ?2, updated_at = ?3 WHERE id = ?1",
            rusqlite::params![id, status.to_string(), time::encode(now)],
        )?;
        if n == 0 {
            return Err(ContentError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Take a listing down for good: mark it inactive and drop its expiry.
    #[instrument(skip(self))]
    pub fn expire(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE posts SET status = 'inactive', sleep_until = NULL, updated_at = ?2
             WHERE id = ?1",
            rusqlite::params![id, time::encode(now)],
        )?;
        Ok(n > 0)
    }

    /// Delete a post and its index entry. Reminder tasks pointing at the
    /// post go with it (foreign-key cascade).
    #[instrument(skip(self))]
    pub fn delete(&self, id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let row: Option<(i64, String, String, String, String, String, String, String)> = conn
            .query_row(
                "SELECT seq, title, body, tags, location_name, country_name, types, regions
                 FROM posts WHERE id = ?1",
                [id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                    ))
                },
            )
            .optional()?;
        let Some((seq, title, body, tags, location, country, types, regions)) = row else {
            return Ok(false);
        };

        // External-content tables need the old values to remove the entry.
        conn.execute(
            "INSERT INTO posts_fts(posts_fts, rowid, title, body, tags, location_name,
                                   country_name, types, regions)
             VALUES ('delete', ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![seq, title, body, tags, location, country, types, regions],
        )?;
        conn.execute("DELETE FROM posts WHERE seq = ?1", [seq])?;
        info!(post_id = id, "post deleted");
        Ok(true)
    }

    /// Claim the published job whose lifetime ran out longest ago.
    pub fn claim_expiring(&self, now: DateTime<Utc>, lease_for: Duration) -> Result<Option<Lease>> {
        let conn = self.conn()?;
        Ok(lease::claim_next(&conn, POSTS_TABLE, now, lease_for)?)
    }

    pub fn release(&self, lease: &Lease, retry_at: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn()?;
        Ok(lease::release_claim(&conn, POSTS_TABLE, lease, retry_at)?)
    }
}

fn get_post(conn: &Connection, id: &str) -> Result<Option<Post>> {
    let sql = format!("SELECT {POST_COLUMNS} FROM posts p WHERE p.id = ?1");
    Ok(conn.query_row(&sql, [id], row_to_post).optional()?)
}

fn json_list(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parsed<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

/// Map the [`POST_COLUMNS`] prefix of a row.
pub(crate) fn row_to_post(row: &rusqlite::Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        kind: parsed(row, 1)?,
        parent_id: row.get(2)?,
        user_id: row.get(3)?,
        title: row.get(4)?,
        slug: row.get(5)?,
        body: row.get(6)?,
        location_name: row.get(7)?,
        country_name: row.get(8)?,
        types: json_list(row, 9)?,
        regions: json_list(row, 10)?,
        tags: json_list(row, 11)?,
        status: parsed(row, 12)?,
        featured: row.get(13)?,
        image: row.get(14)?,
        dates_start: time::column_opt(row, 15)?,
        dates_end: time::column_opt(row, 16)?,
        published_at: time::column_opt(row, 17)?,
        sleep_until: time::column_opt(row, 18)?,
        created_at: time::column(row, 19)?,
        updated_at: time::column(row, 20)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 31, 10, 0, 0).unwrap()
    }

    fn store() -> ContentStore {
        let conn = vitae_core::db::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        ContentStore::new(vitae_core::db::shared(conn))
    }

    fn fts_hits(store: &ContentStore, query: &str) -> i64 {
        let conn = store.conn().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM posts_fts WHERE posts_fts MATCH ?1",
            [query],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn insert_creates_draft_and_index_entry() {
        let store = store();
        let mut new = NewPost::new(PostKind::Venue, "u1", "The Blue Note");
        new.location_name = "Köln".into();
        new.tags = vec!["jazz".into()];
        let post = store.insert(&new, t0()).unwrap();

        assert_eq!(post.status, PostStatus::Draft);
        assert!(post.published_at.is_none());
        assert_eq!(post.tags, vec!["jazz"]);
        assert_eq!(fts_hits(&store, "jazz"), 1);
        assert_eq!(fts_hits(&store, "blue"), 1);
    }

    #[test]
    fn publishing_a_job_schedules_expiry() {
        let store = store();
        let job = store
            .insert(&NewPost::new(PostKind::Job, "u1", "Backend Engineer"), t0())
            .unwrap();
        let venue = store
            .insert(&NewPost::new(PostKind::Venue, "u1", "Bar"), t0())
            .unwrap();

        let job = store.publish(&job.id, t0()).unwrap();
        assert_eq!(job.status, PostStatus::Published);
        assert_eq!(job.published_at, Some(t0()));
        assert_eq!(
            job.sleep_until,
            Some(Utc.with_ymd_and_hms(2026, 3, 31, 10, 0, 0).unwrap())
        );

        let venue = store.publish(&venue.id, t0()).unwrap();
        assert!(venue.sleep_until.is_none());
    }

    #[test]
    fn expiring_jobs_are_claimed_then_expired() {
        let store = store();
        let job = store
            .insert(&NewPost::new(PostKind::Job, "u1", "Barista"), t0())
            .unwrap();
        store.publish(&job.id, t0()).unwrap();
        let lease = Duration::minutes(10);

        assert!(store.claim_expiring(t0(), lease).unwrap().is_none());
        let later = t0() + Duration::days(70);
        let claim = store.claim_expiring(later, lease).unwrap().unwrap();
        assert_eq!(claim.id, job.id);

        assert!(store.expire(&job.id, later).unwrap());
        assert!(store.release(&claim, later).unwrap());
        let job = store.get(&job.id).unwrap().unwrap();
        assert_eq!(job.status, PostStatus::Inactive);
        assert!(job.sleep_until.is_none());
    }

    #[test]
    fn delete_removes_index_entry() {
        let store = store();
        let post = store
            .insert(&NewPost::new(PostKind::Blog, "u1", "Release notes"), t0())
            .unwrap();
        assert_eq!(fts_hits(&store, "release"), 1);

        assert!(store.delete(&post.id).unwrap());
        assert_eq!(fts_hits(&store, "release"), 0);
        assert!(store.get(&post.id).unwrap().is_none());
        assert!(!store.delete(&post.id).unwrap());
    }

    #[test]
    fn unknown_post_cannot_be_published() {
        let store = store();
        assert!(matches!(
            store.publish("nope", t0()),
            Err(ContentError::NotFound(_))
        ));
    }
}
