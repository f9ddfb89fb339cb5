#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use vitae_content::{NewPost, PostKind};
use vitae_core::config::{SiteConfig, WatermarkPolicy};
use vitae_core::types::{PushKeys, PushSubscription};
use vitae_notify::{EmailMessage, EmailSender, NotifyError, PushPayload, PushSender};
use vitae_scheduler::{Stores, TaskHandler};
use vitae_users::{NewUser, User};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 9, 14, 10, 0, 0).unwrap()
}

pub fn stores() -> Stores {
    let conn = vitae_core::db::open_in_memory().unwrap();
    vitae_scheduler::init_all(&conn).unwrap();
    Stores::new(vitae_core::db::shared(conn))
}

pub fn site() -> SiteConfig {
    SiteConfig {
        name: "Vitae".into(),
        hostname: "https://vitae.test".into(),
        mail_from: "no-reply@vitae.test".into(),
    }
}

pub fn subscription() -> PushSubscription {
    PushSubscription {
        endpoint: "https://push.test/abc".into(),
        expiration_time: None,
        keys: PushKeys {
            p256dh: "pk".into(),
            auth: "au".into(),
        },
    }
}

pub fn user(stores: &Stores, name: &str) -> User {
    stores
        .users
        .create(&NewUser::new(name, format!("{name}@example.com")), t0())
        .unwrap()
}

/// Insert and publish a post at `at`.
pub fn publish(stores: &Stores, post: NewPost, at: DateTime<Utc>) -> String {
    let id = stores.content.insert(&post, at).unwrap().id;
    stores.content.publish(&id, at).unwrap();
    id
}

pub fn job(title: &str) -> NewPost {
    NewPost::new(PostKind::Job, "poster", title)
}

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<EmailMessage>>,
    pub fail: AtomicBool,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl EmailSender for RecordingMailer {
    async fn send(&self, msg: &EmailMessage) -> vitae_notify::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError::Rejected {
                status: 503,
                body: "relay down".into(),
            });
        }
        self.sent.lock().unwrap().push(msg.clone());
        Ok(())
    }
}

/// How the fake push service answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PushReply {
    #[default]
    Accept,
    Gone,
    Fail,
}

#[derive(Default)]
pub struct RecordingPusher {
    pub sent: Mutex<Vec<(PushSubscription, PushPayload)>>,
    pub reply: Mutex<PushReply>,
}

impl RecordingPusher {
    pub fn sent(&self) -> Vec<(PushSubscription, PushPayload)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn reply_with(&self, reply: PushReply) {
        *self.reply.lock().unwrap() = reply;
    }
}

#[async_trait]
impl PushSender for RecordingPusher {
    async fn push(&self, sub: &PushSubscription, payload: &PushPayload) -> vitae_notify::Result<()> {
        let reply = *self.reply.lock().unwrap();
        match reply {
            PushReply::Accept => {
                self.sent.lock().unwrap().push((sub.clone(), payload.clone()));
                Ok(())
            }
            PushReply::Gone => Err(NotifyError::SubscriptionGone { status: 410 }),
            PushReply::Fail => Err(NotifyError::Rejected {
                status: 500,
                body: "oops".into(),
            }),
        }
    }
}

pub struct Harness {
    pub stores: Stores,
    pub mailer: Arc<RecordingMailer>,
    pub pusher: Arc<RecordingPusher>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            stores: stores(),
            mailer: Arc::new(RecordingMailer::default()),
            pusher: Arc::new(RecordingPusher::default()),
        }
    }

    pub fn handler(&self, watermark: WatermarkPolicy) -> TaskHandler {
        TaskHandler::new(
            self.stores.clone(),
            self.mailer.clone(),
            self.pusher.clone(),
            site(),
            watermark,
        )
    }
}

/// Poll `check` every few milliseconds until it holds or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..400 {
        if check() {
            return true;
        }
        tokio::time::sleep(StdDuration::from_millis(5)).await;
    }
    check()
}
