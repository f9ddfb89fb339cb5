//! `vitae-users` — accounts and saved alert definitions.
//!
//! Only the fields the scheduling engine reads or writes live here: contact
//! address, verification state, the browser push subscription and the
//! alert criteria. Credentials and sessions belong to the auth service.

pub mod alerts;
pub mod db;
pub mod error;
pub mod types;
pub mod users;

pub use alerts::AlertStore;
pub use error::{Result, UserError};
pub use types::{Alert, AlertDraft, AlertType, Frequency, NewUser, User};
pub use users::UserStore;
