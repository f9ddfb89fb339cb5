//! Senders that only log. Used in development and whenever no relay is
//! configured.

use async_trait::async_trait;
use tracing::info;
use vitae_core::types::PushSubscription;

use crate::error::Result;
use crate::sender::{EmailSender, PushSender};
use crate::types::{EmailMessage, PushPayload};

#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl EmailSender for LogMailer {
    async fn send(&self, msg: &EmailMessage) -> Result<()> {
        let vars = serde_json::to_string(&msg.vars)?;
        info!(template = %msg.template, to = %msg.to, %vars, "email (preview, not sent)");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogPusher;

#[async_trait]
impl PushSender for LogPusher {
    async fn push(&self, subscription: &PushSubscription, payload: &PushPayload) -> Result<()> {
        info!(
            endpoint = %subscription.endpoint,
            title = %payload.title,
            url = %payload.url,
            "push (preview, not sent)"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitae_core::types::PushKeys;

    #[tokio::test]
    async fn preview_senders_always_succeed() {
        let msg = EmailMessage::new("posts", "S <s@x>", "u@x").var("type", "job");
        assert!(LogMailer.send(&msg).await.is_ok());

        let sub = PushSubscription {
            endpoint: "https://push.example/1".into(),
            expiration_time: None,
            keys: PushKeys {
                p256dh: "k".into(),
                auth: "a".into(),
            },
        };
        let payload = PushPayload {
            title: "t".into(),
            image: "i".into(),
            url: "u".into(),
            text: "x".into(),
        };
        assert!(LogPusher.push(&sub, &payload).await.is_ok());
    }
}
