use std::sync::Arc;

use chrono::{Duration, Utc};

use uuid::Uuid;

use courier::client::MemoryTransport;
use courier::engine::{DeliveryConfig, DeliveryEngine};
use courier::model::{Message, Newsletter, Site, Submission, Subscription};
use courier::repo::{MemoryStore, RecipientStore, SubmissionStore};
use courier::template::TemplateStore;

/// A newsletter with two subscribed recipients, wired to in-memory stores
/// and a capturing transport
pub struct TestList {
    pub store: Arc<MemoryStore>,
    pub transport: Arc<MemoryTransport>,
    pub engine: DeliveryEngine,
    pub newsletter: Newsletter,
    pub message: Message,
    pub subscriptions: Vec<Subscription>,
}

impl TestList {
    pub async fn spawn() -> Self {
        Self::spawn_with(DeliveryConfig::default()).await
    }

    pub async fn spawn_with(config: DeliveryConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(MemoryTransport::new());

        let newsletter = Newsletter::new(
            "Test newsletter",
            "test-newsletter",
            "Test Sender",
            "test@testsender.com".parse().unwrap(),
        );
        let mut message = Message::new(newsletter.id, "Test message", "test-message");
        message.add_article(
            "Test title",
            "This should be a very long text with <html> in it as well.",
            None,
        );

        store.add_newsletter(newsletter.clone()).await.unwrap();
        store.add_message(message.clone()).await.unwrap();

        let mut subscriptions = Vec::new();
        for (name, email) in [("Test Name", "test@test.com"), ("René Luçon", "rene@test.com")] {
            let mut subscription = Subscription::new(
                newsletter.id,
                Some(name.parse().unwrap()),
                email.parse().unwrap(),
            );
            subscription.subscribe();
            RecipientStore::save(store.as_ref(), &subscription)
                .await
                .unwrap();
            subscriptions.push(subscription);
        }

        let engine = Self::engine(&store, &transport, TemplateStore::builtin(), config);

        Self {
            store,
            transport,
            engine,
            newsletter,
            message,
            subscriptions,
        }
    }

    pub fn site() -> Site {
        Site::new("example.com", "Example")
    }

    fn engine(
        store: &Arc<MemoryStore>,
        transport: &Arc<MemoryTransport>,
        templates: TemplateStore,
        config: DeliveryConfig,
    ) -> DeliveryEngine {
        DeliveryEngine::new(
            store.clone(),
            store.clone(),
            store.clone(),
            transport.clone(),
            templates,
            Self::site(),
            config,
        )
    }

    /// A second engine over the same stores and transport, with its own
    /// template table
    pub fn engine_with_templates(&self, templates: TemplateStore) -> DeliveryEngine {
        Self::engine(
            &self.store,
            &self.transport,
            templates,
            DeliveryConfig::default(),
        )
    }

    /// Build a submission for the fixture message, mark it prepared and
    /// backdate it, so the next queue pass picks it up
    pub async fn prepared_submission(&self) -> Submission {
        let mut submission = self.engine.from_message(&self.message).await.unwrap();
        submission.prepare();
        submission.publish_date = Utc::now() - Duration::seconds(1);
        self.save_submission(&submission).await;
        submission
    }

    /// Add another subscribed recipient to the fixture newsletter
    pub async fn add_subscriber(&mut self, name: &str, email: &str) -> Subscription {
        let mut subscription = Subscription::new(
            self.newsletter.id,
            Some(name.parse().unwrap()),
            email.parse().unwrap(),
        );
        subscription.subscribe();
        self.save_subscription(&subscription).await;
        self.subscriptions.push(subscription.clone());
        subscription
    }

    pub async fn save_subscription(&self, subscription: &Subscription) {
        RecipientStore::save(self.store.as_ref(), subscription)
            .await
            .unwrap();
    }

    pub async fn save_submission(&self, submission: &Submission) {
        SubmissionStore::save(self.store.as_ref(), submission)
            .await
            .unwrap();
    }

    /// Re-read a submission from the store
    pub async fn submission(&self, id: Uuid) -> Submission {
        SubmissionStore::get(self.store.as_ref(), id)
            .await
            .unwrap()
            .unwrap()
    }
}
