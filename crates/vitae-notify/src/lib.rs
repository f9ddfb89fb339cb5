//! `vitae-notify` — outbound email and browser push.
//!
//! The scheduler only sees the [`EmailSender`] and [`PushSender`] traits.
//! Rendering and delivery happen behind relays: the mail relay owns the
//! templates, the push relay owns the VAPID keys.

pub mod error;
pub mod http;
pub mod preview;
pub mod sender;
pub mod types;

use std::sync::Arc;

use vitae_core::config::{SenderConfig, SenderMode};

pub use error::{NotifyError, Result};
pub use http::{HttpMailer, HttpPushRelay};
pub use preview::{LogMailer, LogPusher};
pub use sender::{EmailSender, PushSender};
pub use types::{EmailMessage, PushPayload};

/// Build the email sender selected by `[notify.email]`.
pub fn email_sender(cfg: &SenderConfig) -> Result<Arc<dyn EmailSender>> {
    match cfg.mode {
        SenderMode::Log => Ok(Arc::new(LogMailer)),
        SenderMode::Http => {
            let endpoint = required_endpoint(cfg, "notify.email")?;
            Ok(Arc::new(HttpMailer::new(endpoint, cfg.api_key.clone())))
        }
    }
}

/// Build the push sender selected by `[notify.push]`.
pub fn push_sender(cfg: &SenderConfig) -> Result<Arc<dyn PushSender>> {
    match cfg.mode {
        SenderMode::Log => Ok(Arc::new(LogPusher)),
        SenderMode::Http => {
            let endpoint = required_endpoint(cfg, "notify.push")?;
            Ok(Arc::new(HttpPushRelay::new(endpoint, cfg.api_key.clone())))
        }
    }
}

fn required_endpoint(cfg: &SenderConfig, section: &str) -> Result<String> {
    cfg.endpoint
        .clone()
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| NotifyError::Config(format!("{section}.endpoint is required in http mode")))
}
