use async_trait::async_trait;

use chrono::{DateTime, Utc};

use tokio::sync::Mutex;

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{Message, Newsletter, Submission, Subscription};

use super::{ContentStore, RecipientStore, SubmissionStore};

#[derive(Debug, Default)]
struct Inner {
    newsletters: Vec<Newsletter>,
    messages: Vec<Message>,
    subscriptions: Vec<Subscription>,
    submissions: Vec<Submission>,
}

/// In-process store backing all three store traits.
///
/// Insertion order is preserved, so snapshot and queue ordering are stable.
/// Used as the test double and for single-process deployments without a
/// database.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a newsletter; slugs must be unique
    pub async fn add_newsletter(&self, newsletter: Newsletter) -> Result<()> {
        let mut inner = self.inner.lock().await;

        if inner
            .newsletters
            .iter()
            .any(|n| n.slug == newsletter.slug && n.id != newsletter.id)
        {
            return Err(Error::Validation(format!(
                "A newsletter with slug {} already exists",
                newsletter.slug
            )));
        }

        inner.newsletters.retain(|n| n.id != newsletter.id);
        inner.newsletters.push(newsletter);
        Ok(())
    }

    /// Seed a message; (newsletter, slug) pairs must be unique
    pub async fn add_message(&self, message: Message) -> Result<()> {
        let mut inner = self.inner.lock().await;

        if inner.messages.iter().any(|m| {
            m.newsletter_id == message.newsletter_id && m.slug == message.slug && m.id != message.id
        }) {
            return Err(Error::Validation(format!(
                "A message with slug {} already exists for this newsletter",
                message.slug
            )));
        }

        inner.messages.retain(|m| m.id != message.id);
        inner.messages.push(message);
        Ok(())
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn newsletter(&self, id: Uuid) -> Result<Option<Newsletter>> {
        let inner = self.inner.lock().await;
        Ok(inner.newsletters.iter().find(|n| n.id == id).cloned())
    }

    async fn message(&self, id: Uuid) -> Result<Option<Message>> {
        let inner = self.inner.lock().await;
        Ok(inner.messages.iter().find(|m| m.id == id).cloned())
    }
}

#[async_trait]
impl RecipientStore for MemoryStore {
    async fn save(&self, subscription: &Subscription) -> Result<()> {
        subscription.validate()?;

        let mut inner = self.inner.lock().await;

        let duplicate = inner.subscriptions.iter().any(|other| {
            other.id != subscription.id
                && other.newsletter_id == subscription.newsletter_id
                && other.email() == subscription.email()
        });
        if duplicate {
            return Err(Error::Validation(
                "A subscription for this e-mail address already exists".into(),
            ));
        }

        match inner
            .subscriptions
            .iter_mut()
            .find(|s| s.id == subscription.id)
        {
            Some(existing) => *existing = subscription.clone(),
            None => inner.subscriptions.push(subscription.clone()),
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Subscription>> {
        let inner = self.inner.lock().await;
        Ok(inner.subscriptions.iter().find(|s| s.id == id).cloned())
    }

    async fn subscribed_for(&self, newsletter_id: Uuid) -> Result<Vec<Subscription>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .subscriptions
            .iter()
            .filter(|s| s.newsletter_id == newsletter_id && s.is_subscribed())
            .cloned()
            .collect())
    }

    async fn subscribed_among(&self, ids: &[Uuid]) -> Result<Vec<Subscription>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .subscriptions
            .iter()
            .filter(|s| ids.contains(&s.id) && s.is_subscribed())
            .cloned()
            .collect())
    }
}

impl Inner {
    /// Shared insert/update validation: at most one publishable submission
    /// per message
    fn check_publishable(&self, submission: &Submission) -> Result<()> {
        if !submission.publish {
            return Ok(());
        }
        let duplicate = self.submissions.iter().any(|other| {
            other.id != submission.id
                && other.message_id == submission.message_id
                && other.publish
        });
        if duplicate {
            return Err(Error::Validation(
                "A publishable submission already exists for this message".into(),
            ));
        }
        Ok(())
    }

    /// The newsletter reference always follows the message
    fn derive_newsletter(&self, submission: &mut Submission) {
        if let Some(message) = self.messages.iter().find(|m| m.id == submission.message_id) {
            submission.newsletter_id = message.newsletter_id;
        }
    }
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn insert(&self, submission: &Submission) -> Result<()> {
        let mut inner = self.inner.lock().await;

        inner.check_publishable(submission)?;

        let mut submission = submission.clone();
        inner.derive_newsletter(&mut submission);
        inner.submissions.push(submission);
        Ok(())
    }

    async fn save(&self, submission: &Submission) -> Result<()> {
        let mut inner = self.inner.lock().await;

        inner.check_publishable(submission)?;

        let mut submission = submission.clone();
        inner.derive_newsletter(&mut submission);

        match inner
            .submissions
            .iter_mut()
            .find(|s| s.id == submission.id)
        {
            Some(existing) => {
                *existing = submission;
                Ok(())
            }
            None => Err(Error::not_found("Submission", submission.id)),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<Submission>> {
        let inner = self.inner.lock().await;
        Ok(inner.submissions.iter().find(|s| s.id == id).cloned())
    }

    async fn set_recipients(&self, id: Uuid, recipients: &[Uuid]) -> Result<()> {
        let mut inner = self.inner.lock().await;

        match inner.submissions.iter_mut().find(|s| s.id == id) {
            Some(submission) => {
                submission.recipients = recipients.to_vec();
                Ok(())
            }
            None => Err(Error::not_found("Submission", id)),
        }
    }

    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<Submission>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .submissions
            .iter()
            .filter(|s| s.prepared && !s.sent && !s.sending && s.publish_date < now)
            .cloned()
            .collect())
    }

    async fn claim(&self, id: Uuid) -> Result<bool> {
        let mut inner = self.inner.lock().await;

        match inner.submissions.iter_mut().find(|s| s.id == id) {
            Some(submission) if submission.prepared && !submission.sent && !submission.sending => {
                submission.sending = true;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(Error::not_found("Submission", id)),
        }
    }

    async fn release(&self, id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().await;

        match inner.submissions.iter_mut().find(|s| s.id == id) {
            Some(submission) => {
                submission.sending = false;
                Ok(())
            }
            None => Err(Error::not_found("Submission", id)),
        }
    }

    async fn mark_sent(&self, id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().await;

        match inner.submissions.iter_mut().find(|s| s.id == id) {
            Some(submission) => {
                submission.sending = false;
                submission.sent = true;
                Ok(())
            }
            None => Err(Error::not_found("Submission", id)),
        }
    }
}
