mod common;

use chrono::Duration;
use common::{job, publish, t0, user, Harness};
use vitae_content::{NewPost, PostKind};
use vitae_core::config::WatermarkPolicy;
use vitae_scheduler::{Entity, Outcome, ReminderLifecycle, ReminderTarget, SkipReason};

#[tokio::test]
async fn reminder_is_sent_once_and_deleted() {
    let h = Harness::new();
    let ada = user(&h.stores, "ada");
    let mut post = job("Rust Engineer");
    post.location_name = "Lisbon".into();
    let job_id = publish(&h.stores, post, t0());

    let task = ReminderLifecycle::new(h.stores.clone(), 2)
        .remind(&ada.id, &ReminderTarget::Job(job_id.clone()), t0())
        .unwrap();

    let outcome = h
        .handler(WatermarkPolicy::AfterDispatch)
        .handle(&task.id, t0() + Duration::days(2))
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Deleted);
    assert!(h.stores.tasks.get(&task.id).unwrap().is_none());

    let sent = h.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].template, "reminder");
    assert_eq!(sent[0].from, "Vitae <no-reply@vitae.test>");
    assert_eq!(sent[0].vars["username"], "ada");
    assert_eq!(sent[0].vars["post"]["id"], job_id.as_str());
    assert_eq!(sent[0].vars["post"]["title"], "Rust Engineer");
    assert_eq!(sent[0].vars["location"], "Lisbon");
}

#[tokio::test]
async fn deleting_the_item_removes_its_reminder() {
    let h = Harness::new();
    let ada = user(&h.stores, "ada");
    let job_id = publish(&h.stores, job("Rust Engineer"), t0());
    let task = ReminderLifecycle::new(h.stores.clone(), 2)
        .remind(&ada.id, &ReminderTarget::Job(job_id.clone()), t0())
        .unwrap();

    assert!(h.stores.content.delete(&job_id).unwrap());
    assert!(h.stores.tasks.get(&task.id).unwrap().is_none());

    let outcome = h
        .handler(WatermarkPolicy::AfterDispatch)
        .handle(&task.id, t0() + Duration::days(2))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Skipped(SkipReason::MissingEntity(Entity::Task)));
    assert!(h.mailer.sent().is_empty());
}

#[tokio::test]
async fn failed_reminder_email_keeps_the_task() {
    let h = Harness::new();
    let ada = user(&h.stores, "ada");
    let venue = NewPost::new(PostKind::Venue, "poster", "The Jazz Cellar");
    let venue_id = publish(&h.stores, venue, t0());
    let task = ReminderLifecycle::new(h.stores.clone(), 1)
        .remind(&ada.id, &ReminderTarget::Venue(venue_id), t0())
        .unwrap();

    h.mailer.set_failing(true);
    let result = h
        .handler(WatermarkPolicy::AfterDispatch)
        .handle(&task.id, t0() + Duration::days(1))
        .await;

    assert!(result.is_err());
    assert_eq!(h.stores.tasks.get(&task.id).unwrap().unwrap(), task);
}

#[tokio::test]
async fn reminder_for_a_deleted_user_is_skipped() {
    let h = Harness::new();
    let ada = user(&h.stores, "ada");
    let post_id = publish(&h.stores, job("Rust Engineer"), t0());
    let task = ReminderLifecycle::new(h.stores.clone(), 1)
        .remind(&ada.id, &ReminderTarget::Post(post_id), t0())
        .unwrap();

    // The cascade takes the task with the user.
    h.stores.users.delete(&ada.id).unwrap();
    let outcome = h
        .handler(WatermarkPolicy::AfterDispatch)
        .handle(&task.id, t0() + Duration::days(1))
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Skipped(SkipReason::MissingEntity(Entity::Task)));
}
