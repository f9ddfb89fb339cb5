use rusqlite::{Connection, Result};

/// Initialise the tasks table. The users, alerts and posts tables must exist
/// first (see `crate::init_all`) because tasks reference all three.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_tasks_table(conn)
}

fn create_tasks_table(conn: &Connection) -> Result<()> {
    // A reminder points at exactly one item and no alert; an alert task points
    // at its alert and nothing else. Deleting the user, alert or item deletes
    // the task with it.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS tasks (
            id            TEXT PRIMARY KEY NOT NULL,
            type          TEXT NOT NULL CHECK (type IN ('reminder', 'alert')),
            user_id       TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            job_id        TEXT REFERENCES posts(id) ON DELETE CASCADE,
            venue_id      TEXT REFERENCES posts(id) ON DELETE CASCADE,
            post_id       TEXT REFERENCES posts(id) ON DELETE CASCADE,
            alert_id      TEXT REFERENCES alerts(id) ON DELETE CASCADE,
            sleep_until   TEXT,
            interval      TEXT,
            auto_remove   INTEGER NOT NULL DEFAULT 0,
            lock_token    TEXT,
            locked_until  TEXT,
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL,
            CHECK (
                (type = 'reminder' AND alert_id IS NULL
                    AND (job_id IS NOT NULL) + (venue_id IS NOT NULL) + (post_id IS NOT NULL) = 1)
                OR
                (type = 'alert' AND alert_id IS NOT NULL
                    AND job_id IS NULL AND venue_id IS NULL AND post_id IS NULL)
            )
        );
        CREATE INDEX IF NOT EXISTS idx_tasks_sleep_until
            ON tasks (sleep_until);
        CREATE INDEX IF NOT EXISTS idx_tasks_alert
            ON tasks (alert_id) WHERE alert_id IS NOT NULL;
        CREATE INDEX IF NOT EXISTS idx_tasks_user
            ON tasks (user_id);
        CREATE INDEX IF NOT EXISTS idx_tasks_job
            ON tasks (job_id) WHERE job_id IS NOT NULL;
        CREATE INDEX IF NOT EXISTS idx_tasks_venue
            ON tasks (venue_id) WHERE venue_id IS NOT NULL;
        CREATE INDEX IF NOT EXISTS idx_tasks_post
            ON tasks (post_id) WHERE post_id IS NOT NULL;",
    )
}
