//! Relay-backed senders.
//!
//! Both relays take a JSON POST and answer 2xx on acceptance. The mail relay
//! renders the named template; the push relay signs and forwards to the
//! browser's push service and passes its status code back.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};
use vitae_core::types::PushSubscription;

use crate::error::{NotifyError, Result};
use crate::sender::{EmailSender, PushSender};
use crate::types::{EmailMessage, PushPayload};

pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpMailer {
    pub fn new(endpoint: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
        }
    }
}

#[async_trait]
impl EmailSender for HttpMailer {
    async fn send(&self, msg: &EmailMessage) -> Result<()> {
        debug!(template = %msg.template, to = %msg.to, "posting email to relay");
        let resp = post_json(&self.client, &self.endpoint, self.api_key.as_deref(), msg).await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(status, body = %body, "mail relay rejected message");
            return Err(NotifyError::Rejected { status, body });
        }
        Ok(())
    }
}

pub struct HttpPushRelay {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpPushRelay {
    pub fn new(endpoint: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
        }
    }
}

#[derive(Serialize)]
struct PushRequest<'a> {
    subscription: &'a PushSubscription,
    payload: &'a PushPayload,
}

#[async_trait]
impl PushSender for HttpPushRelay {
    async fn push(&self, subscription: &PushSubscription, payload: &PushPayload) -> Result<()> {
        debug!(endpoint = %subscription.endpoint, "posting push to relay");
        let body = PushRequest {
            subscription,
            payload,
        };
        let resp = post_json(&self.client, &self.endpoint, self.api_key.as_deref(), &body).await?;

        let status = resp.status().as_u16();
        match status {
            200..=299 => Ok(()),
            404 | 410 => Err(NotifyError::SubscriptionGone { status }),
            _ => {
                let body = resp.text().await.unwrap_or_default();
                warn!(status, body = %body, "push relay rejected message");
                Err(NotifyError::Rejected { status, body })
            }
        }
    }
}

async fn post_json<T: Serialize + ?Sized>(
    client: &reqwest::Client,
    url: &str,
    api_key: Option<&str>,
    body: &T,
) -> Result<reqwest::Response> {
    let mut req = client.post(url).json(body);
    if let Some(key) = api_key {
        req = req.bearer_auth(key);
    }
    Ok(req.send().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vitae_core::types::PushKeys;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn subscription() -> PushSubscription {
        PushSubscription {
            endpoint: "https://push.example/sub".into(),
            expiration_time: None,
            keys: PushKeys {
                p256dh: "pk".into(),
                auth: "au".into(),
            },
        }
    }

    fn payload() -> PushPayload {
        PushPayload {
            title: "2 New jobs found @ Site".into(),
            image: "http://site/favicon.svg".into(),
            url: "http://site/alert/abc".into(),
            text: "There are 2 new jobs".into(),
        }
    }

    #[tokio::test]
    async fn mailer_posts_message_with_bearer_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(json!({
                "template": "reminder",
                "to": "ada@example.com",
                "vars": {"sitename": "Site"}
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let mailer = HttpMailer::new(format!("{}/send", server.uri()), Some("secret".into()));
        let msg = EmailMessage::new("reminder", "Site <no-reply@site>", "ada@example.com")
            .var("sitename", "Site");
        mailer.send(&msg).await.unwrap();
    }

    #[tokio::test]
    async fn mailer_surfaces_relay_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let mailer = HttpMailer::new(server.uri(), None);
        let err = mailer
            .send(&EmailMessage::new("posts", "f", "t"))
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::Rejected { status: 500, ref body } if body == "boom"));
    }

    #[tokio::test]
    async fn push_relay_sends_subscription_and_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/push"))
            .and(body_partial_json(json!({
                "subscription": {"endpoint": "https://push.example/sub"},
                "payload": {"url": "http://site/alert/abc"}
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let relay = HttpPushRelay::new(format!("{}/push", server.uri()), None);
        relay.push(&subscription(), &payload()).await.unwrap();
    }

    #[tokio::test]
    async fn gone_subscriptions_are_reported() {
        for status in [404u16, 410] {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;

            let relay = HttpPushRelay::new(server.uri(), None);
            let err = relay.push(&subscription(), &payload()).await.unwrap_err();
            assert!(matches!(err, NotifyError::SubscriptionGone { status: s } if s == status));
        }
    }
}
