//! `vitae-core` — pieces shared by every Vitae subsystem.
//!
//! * [`config`] — `vitae.toml` + `VITAE_*` environment overrides.
//! * [`db`] — the shared SQLite handle and connection setup.
//! * [`lease`] — claim/release SQL for any table that is polled as a queue.
//! * [`time`] — the fixed-width timestamp encoding used in every table.
//! * [`types`] — value types that cross crate boundaries.

pub mod config;
pub mod db;
pub mod error;
pub mod lease;
pub mod slug;
pub mod time;
pub mod types;

pub use error::{Result, VitaeError};
