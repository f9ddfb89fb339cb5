use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Relay rejected the message ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// The push service no longer knows this subscription (404/410). The
    /// stored subscription should be dropped rather than retried.
    #[error("Push subscription is gone ({status})")]
    SubscriptionGone { status: u16 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, NotifyError>;
