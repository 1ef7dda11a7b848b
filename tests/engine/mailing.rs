use std::num::NonZeroUsize;
use std::time::Duration;

use chrono::{Duration as Delta, Utc};

use claims::{assert_err, assert_ok};

use courier::engine::DeliveryConfig;
use courier::model::{Message, Newsletter, Subscription};
use courier::repo::SubmissionStore;
use courier::template::{Action, ActionTemplates, TemplateStore};

use crate::helpers::TestList;

#[tokio::test]
async fn from_message_without_subscribers_yields_an_empty_snapshot() {
    let t = TestList::spawn().await;

    let newsletter = Newsletter::new(
        "Empty newsletter",
        "empty-newsletter",
        "Test Sender",
        "empty@testsender.com".parse().unwrap(),
    );
    let message = Message::new(newsletter.id, "Lonely message", "lonely-message");
    t.store.add_newsletter(newsletter).await.unwrap();
    t.store.add_message(message.clone()).await.unwrap();

    let submission = t.engine.from_message(&message).await.unwrap();

    assert!(submission.recipients.is_empty());
    assert!(!submission.is_prepared());
    assert!(!submission.is_sent());
    assert!(!submission.is_sending());
}

#[tokio::test]
async fn from_message_snapshots_the_current_subscribers() {
    let t = TestList::spawn().await;

    let submission = t.engine.from_message(&t.message).await.unwrap();

    let expected: Vec<_> = t.subscriptions.iter().map(|s| s.id).collect();
    assert_eq!(submission.recipients, expected);
}

#[tokio::test]
async fn from_message_rejects_a_site_outside_the_newsletter_scope() {
    let t = TestList::spawn().await;

    let mut scoped = Newsletter::new(
        "Scoped newsletter",
        "scoped-newsletter",
        "Test Sender",
        "scoped@testsender.com".parse().unwrap(),
    );
    scoped.sites = vec!["somerandom.com".into()];
    let message = Message::new(scoped.id, "Scoped message", "scoped-message");
    t.store.add_newsletter(scoped).await.unwrap();
    t.store.add_message(message.clone()).await.unwrap();

    assert_err!(t.engine.from_message(&message).await);
}

#[tokio::test]
async fn subscribers_added_after_the_snapshot_receive_nothing() {
    let mut t = TestList::spawn().await;

    let submission = t.prepared_submission().await;

    // Joining after the submission was built does not join the campaign
    t.add_subscriber("Other Name", "other@test.com").await;

    t.engine.submit_queue().await.unwrap();

    let submission = t.submission(submission.id).await;
    assert!(submission.is_sent());
    assert!(!submission.is_sending());
    assert_eq!(t.transport.sent_count().await, 2);
}

#[tokio::test]
async fn late_unsubscribes_are_excluded_at_delivery_time() {
    let t = TestList::spawn().await;

    let submission = t.prepared_submission().await;

    // First subscriber unsubscribes after the snapshot was frozen
    let mut unsubscriber = t.subscriptions[0].clone();
    unsubscriber.unsubscribe();
    t.save_subscription(&unsubscriber).await;

    t.engine.submit_queue().await.unwrap();

    // Still in the snapshot, but skipped at delivery time
    let submission = t.submission(submission.id).await;
    assert_eq!(submission.recipients.len(), 2);
    assert!(submission.is_sent());

    let outbox = t.transport.outbox().await;
    assert_eq!(outbox.len(), 1);
    assert!(outbox[0].to.contains("rene@test.com"));
}

#[tokio::test]
async fn future_publish_dates_are_not_selected() {
    let t = TestList::spawn().await;

    let mut submission = t.engine.from_message(&t.message).await.unwrap();
    submission.prepare();
    submission.publish_date = Utc::now() + Delta::hours(1);
    t.save_submission(&submission).await;

    t.engine.submit_queue().await.unwrap();

    let submission = t.submission(submission.id).await;
    assert!(submission.is_prepared());
    assert!(!submission.is_sent());
    assert!(!submission.is_sending());
    assert_eq!(t.transport.sent_count().await, 0);
}

#[tokio::test]
async fn unprepared_submissions_are_not_selected() {
    let t = TestList::spawn().await;

    let submission = t.engine.from_message(&t.message).await.unwrap();

    t.engine.submit_queue().await.unwrap();

    let submission = t.submission(submission.id).await;
    assert!(!submission.is_prepared());
    assert!(!submission.is_sent());
    assert_eq!(t.transport.sent_count().await, 0);
}

#[tokio::test]
async fn a_sent_submission_is_not_reprocessed() {
    let t = TestList::spawn().await;

    t.prepared_submission().await;

    t.engine.submit_queue().await.unwrap();
    t.engine.submit_queue().await.unwrap();

    // No duplicate mail from the second pass
    assert_eq!(t.transport.sent_count().await, 2);
}

#[tokio::test]
async fn a_claimed_submission_is_skipped_without_sending() {
    let t = TestList::spawn().await;

    let submission = t.prepared_submission().await;

    // Another scheduler pass holds the claim
    assert!(t.store.claim(submission.id).await.unwrap());

    assert_ok!(t.engine.submit(&submission).await);
    assert_eq!(t.transport.sent_count().await, 0);

    // Once released, delivery proceeds normally
    t.store.release(submission.id).await.unwrap();
    assert_ok!(t.engine.submit(&submission).await);
    assert_eq!(t.transport.sent_count().await, 2);
}

#[tokio::test]
async fn submitting_a_future_submission_directly_is_an_error() {
    let t = TestList::spawn().await;

    let mut submission = t.engine.from_message(&t.message).await.unwrap();
    submission.prepare();
    submission.publish_date = Utc::now() + Delta::hours(1);
    t.save_submission(&submission).await;

    assert_err!(t.engine.submit(&submission).await);
    assert_eq!(t.transport.sent_count().await, 0);
}

#[tokio::test]
async fn one_failing_recipient_does_not_abort_the_batch() {
    let mut t = TestList::spawn().await;
    t.add_subscriber("Other Name", "other@test.com").await;

    let submission = t.prepared_submission().await;

    t.transport.fail_for("rene@test.com").await;

    t.engine.submit_queue().await.unwrap();

    // The pass completes and the submission counts as sent
    let submission = t.submission(submission.id).await;
    assert!(submission.is_sent());
    assert!(!submission.is_sending());

    let outbox = t.transport.outbox().await;
    assert_eq!(outbox.len(), 2);
    assert!(outbox.iter().all(|email| !email.to.contains("rene@test.com")));
}

#[tokio::test]
async fn sent_mail_carries_content_and_unsubscribe_header() {
    let t = TestList::spawn().await;

    t.prepared_submission().await;
    t.engine.submit_queue().await.unwrap();

    let outbox = t.transport.outbox().await;
    assert_eq!(outbox.len(), 2);

    for subscription in &t.subscriptions {
        let email = subscription.email().unwrap().as_ref();
        let sent = outbox
            .iter()
            .find(|mail| mail.to.contains(email))
            .expect("no mail for subscriber");

        assert!(sent.subject.contains("Test message"));
        assert!(sent.text_body.contains("Test message"));
        assert!(sent.html_body.is_some());
        assert_eq!(sent.from, "Test Sender <test@testsender.com>");

        let expected_url = subscription
            .unsubscribe_activate_url(&TestList::site(), "test-newsletter")
            .unwrap();
        assert_eq!(
            sent.header("List-Unsubscribe"),
            Some(expected_url.as_str())
        );
    }
}

#[tokio::test]
async fn html_alternative_is_dropped_when_newsletter_is_text_only() {
    let t = TestList::spawn().await;

    let mut newsletter = t.newsletter.clone();
    newsletter.send_html = false;
    t.store.add_newsletter(newsletter).await.unwrap();

    t.prepared_submission().await;
    t.engine.submit_queue().await.unwrap();

    let outbox = t.transport.outbox().await;
    assert_eq!(outbox.len(), 2);
    assert!(outbox.iter().all(|mail| mail.html_body.is_none()));
}

#[tokio::test(start_paused = true)]
async fn batches_pause_for_the_configured_delay() {
    let config = DeliveryConfig {
        email_delay: Duration::ZERO,
        batch_size: NonZeroUsize::new(1),
        batch_delay: Duration::from_secs(2),
    };
    let mut t = TestList::spawn_with(config).await;
    t.add_subscriber("Other Name", "other@test.com").await;

    t.prepared_submission().await;

    let started = tokio::time::Instant::now();
    t.engine.submit_queue().await.unwrap();

    // Two pauses between three single-recipient batches, none after the last
    assert_eq!(started.elapsed(), Duration::from_secs(4));
    assert_eq!(t.transport.sent_count().await, 3);
}

#[tokio::test(start_paused = true)]
async fn recipients_within_a_batch_pause_for_the_email_delay() {
    let config = DeliveryConfig {
        email_delay: Duration::from_secs(1),
        batch_size: None,
        batch_delay: Duration::from_secs(10),
    };
    let mut t = TestList::spawn_with(config).await;
    t.add_subscriber("Other Name", "other@test.com").await;

    t.prepared_submission().await;

    let started = tokio::time::Instant::now();
    t.engine.submit_queue().await.unwrap();

    // A single batch: only the two inter-recipient pauses apply
    assert_eq!(started.elapsed(), Duration::from_secs(2));
    assert_eq!(t.transport.sent_count().await, 3);
}

#[tokio::test]
async fn template_resolution_failure_rolls_the_claim_back() {
    let t = TestList::spawn().await;

    let submission = t.prepared_submission().await;

    // No templates configured at all: resolution fails before any send
    let broken = t.engine_with_templates(TemplateStore::new());
    broken.submit_queue().await.unwrap();

    let stored = t.submission(submission.id).await;
    assert!(!stored.is_sent());
    assert!(!stored.is_sending());
    assert_eq!(t.transport.sent_count().await, 0);

    // A later pass with usable templates delivers normally
    t.engine.submit_queue().await.unwrap();

    let stored = t.submission(submission.id).await;
    assert!(stored.is_sent());
    assert_eq!(t.transport.sent_count().await, 2);
}

#[tokio::test]
async fn a_fatal_submission_does_not_block_the_rest_of_the_queue() {
    let t = TestList::spawn().await;

    // A second newsletter with no usable templates in the table below
    let other = Newsletter::new(
        "Other newsletter",
        "other-newsletter",
        "Test Sender",
        "other@testsender.com".parse().unwrap(),
    );
    let mut other_message = Message::new(other.id, "Other message", "other-message");
    other_message.add_article("Other title", "Other text.", None);
    t.store.add_newsletter(other.clone()).await.unwrap();
    t.store.add_message(other_message.clone()).await.unwrap();

    let mut failing = Subscription::new(
        other.id,
        None,
        "failing@test.com".parse().unwrap(),
    );
    failing.subscribe();
    t.save_subscription(&failing).await;

    // Templates exist only as an override for the fixture newsletter, so
    // the other newsletter's submission fails template resolution
    let engine = t.engine_with_templates(TemplateStore::new().with_override(
        "test-newsletter",
        Action::Message,
        ActionTemplates::new("{{ message.title }}", "{{ message.title }}"),
    ));

    // The failing submission is first in the queue
    let mut broken_submission = engine.from_message(&other_message).await.unwrap();
    broken_submission.prepare();
    broken_submission.publish_date = Utc::now() - Delta::seconds(1);
    t.save_submission(&broken_submission).await;

    let healthy_submission = t.prepared_submission().await;

    engine.submit_queue().await.unwrap();

    let broken_stored = t.submission(broken_submission.id).await;
    assert!(!broken_stored.is_sent());
    assert!(!broken_stored.is_sending());

    let healthy_stored = t.submission(healthy_submission.id).await;
    assert!(healthy_stored.is_sent());
    assert_eq!(t.transport.sent_count().await, 2);
}

#[tokio::test]
async fn activation_emails_render_the_action_templates() {
    let t = TestList::spawn().await;
    let subscription = &t.subscriptions[0];

    t.engine
        .send_activation_email(subscription, Action::Subscribe)
        .await
        .unwrap();

    let outbox = t.transport.outbox().await;
    assert_eq!(outbox.len(), 1);
    assert!(outbox[0].to.contains("test@test.com"));
    assert!(outbox[0].subject.contains("Test newsletter"));

    let activation_url = subscription
        .subscribe_activate_url(&TestList::site(), "test-newsletter")
        .unwrap();
    assert!(outbox[0].text_body.contains(activation_url.as_str()));
}

#[tokio::test]
async fn activation_emails_reject_the_message_action() {
    let t = TestList::spawn().await;

    assert_err!(
        t.engine
            .send_activation_email(&t.subscriptions[0], Action::Message)
            .await
    );
}
