//! `vitae-scheduler` — the polling task queue behind reminders and alerts.
//!
//! # Overview
//!
//! Tasks live in the SQLite `tasks` table. A [`CronPoller`] claims due rows
//! under a time-bounded lease and hands each one to the [`TaskHandler`] as
//! an independent tokio task. The handler sends the reminder or runs the
//! alert's saved search, then deletes or reschedules the task.
//!
//! The same poller drives the housekeeping reapers over the `users` and
//! `posts` tables.
//!
//! | Task kind  | On success                                              |
//! |------------|---------------------------------------------------------|
//! | `reminder` | email sent, task deleted                                |
//! | `alert`    | new matches notified, watermark moved to the run time   |

pub mod clock;
pub mod db;
pub mod error;
pub mod handler;
pub mod interval;
pub mod leases;
pub mod lifecycle;
pub mod poller;
pub mod reapers;
pub mod store;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Result, SchedulerError};
pub use handler::{Stores, TaskHandler};
pub use lifecycle::{AlertLifecycle, ReminderLifecycle};
pub use poller::{CronPoller, Disposition, DocumentHandler, LeaseStore, PollerConfig};
pub use reapers::{ListingExpiryReaper, UnverifiedUserReaper};
pub use store::{Claim, TaskStore};
pub use types::{Entity, Outcome, ReminderTarget, SkipReason, Task, TaskKind};

/// Create every table the scheduler needs, in dependency order.
pub fn init_all(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    vitae_users::db::init_db(conn)?;
    vitae_content::db::init_db(conn)?;
    db::init_db(conn)
}
