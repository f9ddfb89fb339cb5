use rusqlite::{Connection, Result};

/// Initialise the users and alerts tables. Safe to call on every startup
/// (CREATE IF NOT EXISTS).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_users_table(conn)?;
    create_alerts_table(conn)?;
    Ok(())
}

fn create_users_table(conn: &Connection) -> Result<()> {
    // sleep_until / lock_token / locked_until make the table pollable by the
    // unverified-account reaper; a NULL sleep_until means nothing is pending.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id                  TEXT PRIMARY KEY NOT NULL,
            username            TEXT NOT NULL UNIQUE,
            email               TEXT NOT NULL UNIQUE,
            verified            INTEGER NOT NULL DEFAULT 0,
            push_subscription   TEXT,               -- JSON PushSubscription
            sleep_until         TEXT,
            lock_token          TEXT,
            locked_until        TEXT,
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_users_sleep_until
            ON users (sleep_until) WHERE sleep_until IS NOT NULL;",
    )
}

fn create_alerts_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS alerts (
            id            TEXT PRIMARY KEY NOT NULL,
            user_id       TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            alert_type    TEXT NOT NULL CHECK (alert_type IN ('job', 'venue')),
            title         TEXT NOT NULL,
            slug          TEXT NOT NULL UNIQUE,
            keywords      TEXT NOT NULL DEFAULT '',
            location      TEXT NOT NULL DEFAULT '',
            types         TEXT NOT NULL DEFAULT '[]',   -- JSON array
            regions       TEXT NOT NULL DEFAULT '[]',   -- JSON array
            dates_start   TEXT,                         -- YYYY-MM-DD
            dates_end     TEXT,
            frequency     TEXT NOT NULL DEFAULT 'weekly',
            active        INTEGER NOT NULL DEFAULT 1,
            email         INTEGER NOT NULL DEFAULT 1,
            notification  INTEGER NOT NULL DEFAULT 0,
            task_id       TEXT,
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_alerts_user
            ON alerts (user_id);",
    )
}
