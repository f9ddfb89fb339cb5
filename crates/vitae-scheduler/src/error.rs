use thiserror::Error;

/// Errors that can occur while scheduling or handling a task.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    User(#[from] vitae_users::UserError),

    #[error(transparent)]
    Content(#[from] vitae_content::ContentError),

    #[error(transparent)]
    Notify(#[from] vitae_notify::NotifyError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The task's recurrence expression does not parse.
    #[error("Invalid interval {expr:?}: {reason}")]
    InvalidInterval { expr: String, reason: String },

    #[error("Task not found: {id}")]
    TaskNotFound { id: String },

    #[error("Alert not found: {id}")]
    AlertNotFound { id: String },

    /// At least one notification for an alert cycle failed; the watermark
    /// was left where it was.
    #[error("{failed} of {attempted} dispatches failed for task {task_id}")]
    DispatchFailed {
        task_id: String,
        attempted: usize,
        failed: usize,
    },

    #[error("Database connection lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
