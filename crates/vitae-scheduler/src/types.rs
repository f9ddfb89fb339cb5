use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The item a reminder is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum ReminderTarget {
    Job(String),
    Venue(String),
    Post(String),
}

impl ReminderTarget {
    pub fn id(&self) -> &str {
        match self {
            Self::Job(id) | Self::Venue(id) | Self::Post(id) => id,
        }
    }

    /// Column that stores this target on the tasks table.
    pub(crate) fn column(&self) -> &'static str {
        match self {
            Self::Job(_) => "job_id",
            Self::Venue(_) => "venue_id",
            Self::Post(_) => "post_id",
        }
    }
}

/// What a task does when it wakes up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TaskKind {
    /// One-shot email about a saved item; the task is deleted once sent.
    Reminder { target: ReminderTarget },
    /// Recurring run of a saved search.
    Alert { alert_id: String },
}

impl TaskKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Reminder { .. } => "reminder",
            Self::Alert { .. } => "alert",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub user_id: String,
    #[serde(flatten)]
    pub kind: TaskKind,
    /// Not eligible before this instant. `None` means due immediately.
    pub sleep_until: Option<DateTime<Utc>>,
    /// Cron expression (5 or 6 fields, UTC) for recurring alerts.
    pub interval: Option<String>,
    pub auto_remove: bool,
    pub created_at: DateTime<Utc>,
    /// Last completed cycle. Alert searches only see items published after it.
    pub updated_at: DateTime<Utc>,
}

/// Why a handler run ended without touching the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The task, its user, its item or its alert no longer exists.
    MissingEntity(Entity),
    /// The alert was switched off but its task is still around.
    AlertInactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Task,
    User,
    Item,
    Alert,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Task => "task",
            Self::User => "user",
            Self::Item => "item",
            Self::Alert => "alert",
        };
        f.write_str(s)
    }
}

/// Result of one successful handler run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Reminder sent and task removed.
    Deleted,
    /// Alert cycle complete; the watermark moved to the run time.
    Advanced {
        matches: usize,
        next_wake: DateTime<Utc>,
    },
    Skipped(SkipReason),
}
