use async_trait::async_trait;
use vitae_core::types::PushSubscription;

use crate::error::Result;
use crate::types::{EmailMessage, PushPayload};

/// Delivers templated email.
///
/// Implementations must be `Send + Sync`; one sender is shared by every
/// in-flight task handler.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Hand the message to the mail relay. `Ok` means the relay accepted it.
    async fn send(&self, msg: &EmailMessage) -> Result<()>;
}

/// Delivers browser push notifications.
#[async_trait]
pub trait PushSender: Send + Sync {
    /// Push `payload` to one subscription. A subscription the push service no
    /// longer recognises yields [`crate::NotifyError::SubscriptionGone`].
    async fn push(&self, subscription: &PushSubscription, payload: &PushPayload) -> Result<()>;
}
