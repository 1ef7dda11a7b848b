use std::thread;
use std::time::Duration;

use claims::{assert_err, assert_ok};

use uuid::Uuid;

use courier::model::{Message, Submission, Subscription, SubscriptionStatus};
use courier::repo::{MemoryStore, RecipientStore, SubmissionStore};

use crate::helpers::TestList;

#[test]
fn subscription_lifecycle_keeps_flags_exclusive_and_restamps_dates() {
    let mut subscription = Subscription::new(
        Uuid::new_v4(),
        Some("Test Name".parse().unwrap()),
        "test@test.com".parse().unwrap(),
    );

    subscription.subscribe();
    let first_subscribe = subscription.subscribe_date().unwrap();

    thread::sleep(Duration::from_millis(5));
    subscription.unsubscribe();
    assert!(subscription.is_unsubscribed());
    assert!(!subscription.is_subscribed());

    thread::sleep(Duration::from_millis(5));
    subscription.subscribe();

    assert_eq!(subscription.status(), SubscriptionStatus::Subscribed);
    assert!(!subscription.is_unsubscribed());
    assert!(subscription.subscribe_date().unwrap() > first_subscribe);
}

#[tokio::test]
async fn duplicate_subscriptions_are_rejected_before_any_write() {
    let t = TestList::spawn().await;

    let duplicate = Subscription::new(
        t.newsletter.id,
        Some("Another Name".parse().unwrap()),
        "test@test.com".parse().unwrap(),
    );

    assert_err!(RecipientStore::save(t.store.as_ref(), &duplicate).await);
    assert!(
        RecipientStore::get(t.store.as_ref(), duplicate.id)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn identity_violations_are_rejected_before_any_write() {
    let store = MemoryStore::new();

    let mut subscription = Subscription::new(
        Uuid::new_v4(),
        None,
        "test@test.com".parse().unwrap(),
    );
    subscription.email = None;

    assert_err!(RecipientStore::save(&store, &subscription).await);
    assert!(
        RecipientStore::get(&store, subscription.id)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn prepared_flag_roundtrips_through_the_store() {
    let t = TestList::spawn().await;

    let mut submission = t.engine.from_message(&t.message).await.unwrap();
    assert!(submission.prepare());
    t.save_submission(&submission).await;

    let stored = t.submission(submission.id).await;
    assert!(stored.is_prepared());
    assert!(!stored.is_sent());
    assert!(!stored.is_sending());
}

#[tokio::test]
async fn only_one_publishable_submission_per_message() {
    let t = TestList::spawn().await;

    assert_ok!(t.engine.from_message(&t.message).await);
    assert_err!(t.engine.from_message(&t.message).await);
}

#[tokio::test]
async fn archived_submissions_do_not_block_a_new_publishable_one() {
    let store = MemoryStore::new();
    let message = Message::new(Uuid::new_v4(), "Test message", "test-message");

    let mut archived = Submission::for_message(&message);
    archived.publish = false;
    store.insert(&archived).await.unwrap();

    assert_ok!(store.insert(&Submission::for_message(&message)).await);
}
