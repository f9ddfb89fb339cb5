use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vitae_core::types::{DateWindow, PushSubscription};

/// An account as seen by the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// UUIDv7 primary key.
    pub id: String,
    pub username: String,
    pub email: String,
    /// Unverified accounts are reaped once `sleep_until` passes.
    pub verified: bool,
    pub push_subscription: Option<PushSubscription>,
    pub sleep_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for [`crate::UserStore::create`].
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
}

impl NewUser {
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
        }
    }
}

/// Which part of the corpus an alert watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Job,
    Venue,
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Job => write!(f, "job"),
            Self::Venue => write!(f, "venue"),
        }
    }
}

impl std::str::FromStr for AlertType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "job" => Ok(Self::Job),
            "venue" => Ok(Self::Venue),
            other => Err(format!("unknown alert type: {other}")),
        }
    }
}

/// How often an alert's task wakes up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    #[default]
    Weekly,
}

impl Frequency {
    /// Cron expression for the task interval: every day at 08:00 UTC, or
    /// every Monday at 08:00 UTC.
    pub fn interval(&self) -> &'static str {
        match self {
            Self::Daily => "0 8 * * *",
            Self::Weekly => "0 8 * * 1",
        }
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Daily => write!(f, "daily"),
            Self::Weekly => write!(f, "weekly"),
        }
    }
}

impl std::str::FromStr for Frequency {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            other => Err(format!("unknown alert frequency: {other}")),
        }
    }
}

/// A saved search that is re-run on a schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub user_id: String,
    pub alert_type: AlertType,
    pub title: String,
    /// Public identifier used in the alert deep link.
    pub slug: String,
    pub keywords: String,
    /// Case-insensitive substring of the item's location name.
    pub location: String,
    /// Category filter (subset semantics, see `vitae-content` search).
    pub types: Vec<String>,
    pub regions: Vec<String>,
    pub dates: Option<DateWindow>,
    pub frequency: Frequency,
    pub active: bool,
    /// Send a digest email on new matches.
    pub email: bool,
    /// Send a browser push notification on new matches.
    pub notification: bool,
    /// The live task while the alert is active.
    pub task_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User-editable part of an alert; input for create and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertDraft {
    pub alert_type: AlertType,
    pub title: String,
    #[serde(default)]
    pub keywords: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub dates: Option<DateWindow>,
    #[serde(default)]
    pub frequency: Frequency,
    #[serde(default = "bool_true")]
    pub active: bool,
    #[serde(default = "bool_true")]
    pub email: bool,
    #[serde(default)]
    pub notification: bool,
}

impl AlertDraft {
    /// A weekly, active, email-only alert with no filters.
    pub fn new(alert_type: AlertType, title: impl Into<String>) -> Self {
        Self {
            alert_type,
            title: title.into(),
            keywords: String::new(),
            location: String::new(),
            types: Vec::new(),
            regions: Vec::new(),
            dates: None,
            frequency: Frequency::Weekly,
            active: true,
            email: true,
            notification: false,
        }
    }
}

fn bool_true() -> bool {
    true
}
