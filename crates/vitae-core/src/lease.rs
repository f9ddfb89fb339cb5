//! Lease-based claiming over an ordinary table.
//!
//! Any table with `id`, `sleep_until`, `lock_token` and `locked_until`
//! columns can be polled as a work queue. A claim is a single
//! `UPDATE … RETURNING` statement, so two pollers can never hold the same row
//! at once. The lease expires on its own: a worker that dies mid-handler
//! blocks the row for at most the lease length.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::time;

/// A table that can be polled through [`claim_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseTable {
    /// SQL table name. Compiled-in constant, never user input.
    pub name: &'static str,
    /// `true`: a NULL `sleep_until` means "due now".
    /// `false`: a NULL `sleep_until` means "nothing scheduled".
    pub null_is_due: bool,
}

/// Proof of an exclusive claim on one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub id: String,
    /// Random per-claim token; release only succeeds while it still matches.
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Claim the most overdue eligible row, if any.
///
/// Eligible: `sleep_until` has elapsed (or is NULL when
/// [`LeaseTable::null_is_due`]) and no unexpired lease is held on the row.
pub fn claim_next(
    conn: &Connection,
    table: LeaseTable,
    now: DateTime<Utc>,
    lease: Duration,
) -> rusqlite::Result<Option<Lease>> {
    let sleep_clause = if table.null_is_due {
        "(sleep_until IS NULL OR sleep_until <= ?3)"
    } else {
        "(sleep_until IS NOT NULL AND sleep_until <= ?3)"
    };
    let sql = format!(
        "UPDATE {name} SET lock_token = ?1, locked_until = ?2
         WHERE id = (
             SELECT id FROM {name}
             WHERE {sleep_clause}
               AND (locked_until IS NULL OR locked_until <= ?3)
             ORDER BY sleep_until, created_at
             LIMIT 1
         )
         RETURNING id",
        name = table.name,
    );

    let token = Uuid::new_v4().to_string();
    let expires_at = now + lease;
    let id: Option<String> = conn
        .query_row(
            &sql,
            rusqlite::params![token, time::encode(expires_at), time::encode(now)],
            |row| row.get(0),
        )
        .optional()?;

    Ok(id.map(|id| Lease {
        id,
        token,
        expires_at,
    }))
}

/// Drop the claim held by `lease` and keep the row back until `retry_at`.
///
/// Returns `false` when the row is gone or the lease was already taken over
/// by a newer claim (the token no longer matches).
pub fn release_claim(
    conn: &Connection,
    table: LeaseTable,
    lease: &Lease,
    retry_at: DateTime<Utc>,
) -> rusqlite::Result<bool> {
    let sql = format!(
        "UPDATE {name} SET lock_token = NULL, locked_until = ?3
         WHERE id = ?1 AND lock_token = ?2",
        name = table.name,
    );
    let n = conn.execute(
        &sql,
        rusqlite::params![lease.id, lease.token, time::encode(retry_at)],
    )?;
    Ok(n == 1)
}
