use rusqlite::{Connection, Result};

/// Initialise the posts table and its full-text index.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_posts_table(conn)?;
    create_fts_index(conn)?;
    Ok(())
}

fn create_posts_table(conn: &Connection) -> Result<()> {
    // `seq` is an explicit INTEGER PRIMARY KEY so the FTS rowid mapping
    // survives VACUUM; `id` is the public identifier.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS posts (
            seq             INTEGER PRIMARY KEY AUTOINCREMENT,
            id              TEXT NOT NULL UNIQUE,
            kind            TEXT NOT NULL
                            CHECK (kind IN ('job', 'venue', 'event', 'company', 'blog')),
            parent_id       TEXT,
            user_id         TEXT NOT NULL,
            title           TEXT NOT NULL,
            slug            TEXT NOT NULL UNIQUE,
            body            TEXT NOT NULL DEFAULT '',
            location_name   TEXT NOT NULL DEFAULT '',
            country_name    TEXT NOT NULL DEFAULT '',
            types           TEXT NOT NULL DEFAULT '[]',
            regions         TEXT NOT NULL DEFAULT '[]',
            tags            TEXT NOT NULL DEFAULT '[]',
            status          TEXT NOT NULL DEFAULT 'draft',
            featured        INTEGER NOT NULL DEFAULT 0,
            image           TEXT,
            dates_start     TEXT,
            dates_end       TEXT,
            published_at    TEXT,
            sleep_until     TEXT,
            lock_token      TEXT,
            locked_until    TEXT,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_posts_kind_published
            ON posts (kind, status, published_at);
        CREATE INDEX IF NOT EXISTS idx_posts_sleep_until
            ON posts (sleep_until) WHERE sleep_until IS NOT NULL;",
    )
}

/// External-content FTS5 index over the searchable text of a post.
/// `ContentStore` keeps it in sync on every insert and delete.
fn create_fts_index(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE VIRTUAL TABLE IF NOT EXISTS posts_fts
            USING fts5(title, body, tags, location_name, country_name, types, regions,
                       content='posts', content_rowid='seq');",
    )
}
