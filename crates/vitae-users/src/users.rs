use std::sync::MutexGuard;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info, instrument};
use vitae_core::db::SharedConnection;
use vitae_core::lease::{self, Lease, LeaseTable};
use vitae_core::time;
use vitae_core::types::PushSubscription;

use crate::error::{Result, UserError};
use crate::types::{NewUser, User};

/// Unverified accounts are removed this long after sign-up.
pub const VERIFICATION_WINDOW_DAYS: i64 = 3;

/// Polled by the unverified-account reaper. A NULL `sleep_until` means the
/// account has nothing pending.
pub const USERS_TABLE: LeaseTable = LeaseTable {
    name: "users",
    null_is_due: false,
};

const SELECT_USER: &str = "SELECT id, username, email, verified, push_subscription,
                                  sleep_until, created_at, updated_at
                           FROM users";

/// Account storage. Cheap to clone; all clones share one connection.
#[derive(Clone)]
pub struct UserStore {
    db: SharedConnection,
}

impl UserStore {
    pub fn new(db: SharedConnection) -> Self {
        Self { db }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| UserError::LockPoisoned)
    }

    /// Register an account. It starts unverified and is scheduled for removal
    /// [`VERIFICATION_WINDOW_DAYS`] from `now` unless verified in time.
    #[instrument(skip(self, new), fields(username = %new.username))]
    pub fn create(&self, new: &NewUser, now: DateTime<Utc>) -> Result<User> {
        let conn = self.conn()?;
        let user = User {
            id: uuid::Uuid::now_v7().to_string(),
            username: new.username.clone(),
            email: new.email.clone(),
            verified: false,
            push_subscription: None,
            sleep_until: Some(now + Duration::days(VERIFICATION_WINDOW_DAYS)),
            created_at: now,
            updated_at: now,
        };
        let result = conn.execute(
            "INSERT INTO users (id, username, email, verified, sleep_until, created_at, updated_at)
             VALUES (?1, ?2, ?3, 0, ?4, ?5, ?5)",
            rusqlite::params![
                user.id,
                user.username,
                user.email,
                user.sleep_until.map(time::encode),
                time::encode(now),
            ],
        );
        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(UserError::AlreadyExists(new.username.clone()));
            }
            Err(e) => return Err(e.into()),
        }
        info!(user_id = %user.id, "user created");
        Ok(user)
    }

    /// Look up a user by id. Returns `None` when the account is gone.
    #[instrument(skip(self))]
    pub fn get(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn()?;
        get_user(&conn, id)
    }

    /// Mark the account verified. The pending expiry is left for the reaper,
    /// which clears it on its next pass.
    #[instrument(skip(self))]
    pub fn mark_verified(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE users SET verified = 1, updated_at = ?2 WHERE id = ?1",
            rusqlite::params![id, time::encode(now)],
        )?;
        if n == 0 {
            return Err(UserError::NotFound(id.to_string()));
        }
        Ok(())
    }

    #[instrument(skip(self, sub))]
    pub fn set_push_subscription(
        &self,
        id: &str,
        sub: &PushSubscription,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let json = serde_json::to_string(sub)?;
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE users SET push_subscription = ?2, updated_at = ?3 WHERE id = ?1",
            rusqlite::params![id, json, time::encode(now)],
        )?;
        if n == 0 {
            return Err(UserError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Forget the stored push subscription, e.g. after the push service
    /// reported it gone. Returns whether one was stored.
    #[instrument(skip(self))]
    pub fn clear_push_subscription(&self, id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE users SET push_subscription = NULL
             WHERE id = ?1 AND push_subscription IS NOT NULL",
            [id],
        )?;
        if n > 0 {
            info!(user_id = id, "push subscription cleared");
        }
        Ok(n > 0)
    }

    /// Take the account off the expiry schedule.
    #[instrument(skip(self))]
    pub fn clear_sleep(&self, id: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("UPDATE users SET sleep_until = NULL WHERE id = ?1", [id])?;
        Ok(())
    }

    /// Delete the account. Alerts and tasks go with it (FK cascade).
    #[instrument(skip(self))]
    pub fn delete(&self, id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
        if n > 0 {
            info!(user_id = id, "user deleted");
        }
        Ok(n > 0)
    }

    /// Claim the account whose expiry is most overdue.
    pub fn claim_expiring(&self, now: DateTime<Utc>, lease_for: Duration) -> Result<Option<Lease>> {
        let conn = self.conn()?;
        let lease = lease::claim_next(&conn, USERS_TABLE, now, lease_for)?;
        if let Some(l) = &lease {
            debug!(user_id = %l.id, "claimed expiring user");
        }
        Ok(lease)
    }

    pub fn release(&self, lease: &Lease, retry_at: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn()?;
        Ok(lease::release_claim(&conn, USERS_TABLE, lease, retry_at)?)
    }
}

fn get_user(conn: &Connection, id: &str) -> Result<Option<User>> {
    let sql = format!("{SELECT_USER} WHERE id = ?1");
    let user = conn.query_row(&sql, [id], row_to_user).optional()?;
    Ok(user)
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let push_json: Option<String> = row.get(4)?;
    let push_subscription = push_json
        .map(|s| serde_json::from_str::<PushSubscription>(&s))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        verified: row.get(3)?,
        push_subscription,
        sleep_until: time::column_opt(row, 5)?,
        created_at: time::column(row, 6)?,
        updated_at: time::column(row, 7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use vitae_core::types::PushKeys;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap()
    }

    fn store() -> UserStore {
        let conn = vitae_core::db::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        UserStore::new(vitae_core::db::shared(conn))
    }

    fn sub() -> PushSubscription {
        PushSubscription {
            endpoint: "https://push.example/xyz".into(),
            expiration_time: None,
            keys: PushKeys {
                p256dh: "pk".into(),
                auth: "au".into(),
            },
        }
    }

    #[test]
    fn new_user_expires_after_three_days() {
        let store = store();
        let user = store.create(&NewUser::new("ada", "ada@example.com"), t0()).unwrap();
        assert!(!user.verified);
        assert_eq!(user.sleep_until, Some(t0() + Duration::days(3)));

        let loaded = store.get(&user.id).unwrap().unwrap();
        assert_eq!(loaded, user);
    }

    #[test]
    fn duplicate_username_is_rejected() {
        let store = store();
        store.create(&NewUser::new("ada", "ada@example.com"), t0()).unwrap();
        let err = store
            .create(&NewUser::new("ada", "other@example.com"), t0())
            .unwrap_err();
        assert!(matches!(err, UserError::AlreadyExists(_)));
    }

    #[test]
    fn push_subscription_roundtrip_and_clear() {
        let store = store();
        let user = store.create(&NewUser::new("bo", "bo@example.com"), t0()).unwrap();
        store.set_push_subscription(&user.id, &sub(), t0()).unwrap();
        assert_eq!(
            store.get(&user.id).unwrap().unwrap().push_subscription,
            Some(sub())
        );

        assert!(store.clear_push_subscription(&user.id).unwrap());
        assert!(!store.clear_push_subscription(&user.id).unwrap());
        assert!(store.get(&user.id).unwrap().unwrap().push_subscription.is_none());
    }

    #[test]
    fn expiring_users_are_claimed_only_when_due() {
        let store = store();
        let user = store.create(&NewUser::new("cy", "cy@example.com"), t0()).unwrap();
        let lease = Duration::minutes(10);

        assert!(store.claim_expiring(t0(), lease).unwrap().is_none());
        let claim = store
            .claim_expiring(t0() + Duration::days(3), lease)
            .unwrap()
            .expect("due after three days");
        assert_eq!(claim.id, user.id);

        store.clear_sleep(&user.id).unwrap();
        assert!(store.release(&claim, t0() + Duration::days(3)).unwrap());
        assert!(store
            .claim_expiring(t0() + Duration::days(30), lease)
            .unwrap()
            .is_none());
    }

    #[test]
    fn missing_user_verification_is_not_found() {
        let store = store();
        assert!(matches!(
            store.mark_verified("nope", t0()),
            Err(UserError::NotFound(_))
        ));
        assert!(!store.delete("nope").unwrap());
    }
}
