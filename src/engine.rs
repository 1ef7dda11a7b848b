use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use uuid::Uuid;

use crate::client::{MailTransport, OutgoingEmail};
use crate::error::{Error, Result};
use crate::model::{Message, Newsletter, Site, Submission, Subscription};
use crate::repo::{ContentStore, RecipientStore, SubmissionStore};
use crate::template::{self, Action, ActionTemplates, TemplateStore};

/// Delivery tunables, passed in explicitly rather than read from a global.
///
/// The delays exist to respect outbound transport rate limits and are real
/// suspensions of the delivery loop.
#[derive(Debug, Clone, Default)]
pub struct DeliveryConfig {
    /// Pause between individual sends within a batch
    pub email_delay: Duration,
    /// Recipients per batch; `None` processes the whole snapshot as one
    /// batch
    pub batch_size: Option<NonZeroUsize>,
    /// Pause between batches
    pub batch_delay: Duration,
}

/// Builds submissions and drains the queue of due ones.
///
/// Driven by an external periodic scheduler calling [`submit_queue`]; there
/// is no internal concurrency. A persisted sending claim keeps overlapping
/// scheduler passes off each other's submissions.
///
/// [`submit_queue`]: DeliveryEngine::submit_queue
pub struct DeliveryEngine {
    content: Arc<dyn ContentStore>,
    recipients: Arc<dyn RecipientStore>,
    submissions: Arc<dyn SubmissionStore>,
    transport: Arc<dyn MailTransport>,
    templates: TemplateStore,
    site: Site,
    config: DeliveryConfig,
}

impl DeliveryEngine {
    pub fn new(
        content: Arc<dyn ContentStore>,
        recipients: Arc<dyn RecipientStore>,
        submissions: Arc<dyn SubmissionStore>,
        transport: Arc<dyn MailTransport>,
        templates: TemplateStore,
        site: Site,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            content,
            recipients,
            submissions,
            transport,
            templates,
            site,
            config,
        }
    }

    /// Build a new submission for `message`, freezing the recipient
    /// snapshot.
    ///
    /// Two-phase: the submission is persisted first, then the current set
    /// of subscribed recipients is attached. Anyone subscribing afterwards
    /// does not join a campaign already in flight.
    #[tracing::instrument(name = "Build submission from message", skip(self, message), fields(message = %message.id))]
    pub async fn from_message(&self, message: &Message) -> Result<Submission> {
        let newsletter = self.newsletter(message.newsletter_id).await?;

        if !newsletter.serves(&self.site) {
            return Err(Error::Validation(format!(
                "Submission of message {} is not valid for site {}",
                message.slug, self.site.domain
            )));
        }

        let mut submission = Submission::for_message(message);
        self.submissions.insert(&submission).await?;

        let snapshot = self.recipients.subscribed_for(newsletter.id).await?;
        let ids: Vec<Uuid> = snapshot.iter().map(|s| s.id).collect();
        self.submissions.set_recipients(submission.id, &ids).await?;
        submission.recipients = ids;

        Ok(submission)
    }

    /// Drain the queue: deliver every prepared, unsent submission whose
    /// publish date has passed.
    ///
    /// Safe to re-invoke while a previous pass is still in flight;
    /// submissions being sent elsewhere are skipped. A failed submission is
    /// logged and does not keep the rest of the due set from being
    /// attempted.
    #[tracing::instrument(name = "Submit queue", skip(self))]
    pub async fn submit_queue(&self) -> Result<()> {
        let due = self.submissions.due(Utc::now()).await?;

        tracing::info!("Submitting queued newsletter mailings: {} due", due.len());

        for submission in due {
            if let Err(error) = self.submit(&submission).await {
                tracing::error!(
                    error = %error,
                    submission = %submission.id,
                    "Submission failed; eligible again on the next pass"
                );
            }
        }
        Ok(())
    }

    /// Fully deliver one submission.
    ///
    /// Claims the sending flag up front; on a fatal error the claim is
    /// rolled back and the error propagates, leaving the submission
    /// eligible for a future pass. Individual recipient failures never
    /// abort the pass: a submission that completes is sent, full stop.
    #[tracing::instrument(name = "Submit submission", skip(self, submission), fields(submission = %submission.id))]
    pub async fn submit(&self, submission: &Submission) -> Result<()> {
        if submission.publish_date >= Utc::now() {
            return Err(Error::Inconsistency(
                "Something smells fishy; submission time in future".into(),
            ));
        }

        if !self.submissions.claim(submission.id).await? {
            tracing::info!("Submission is already sending or sent; skipping");
            return Ok(());
        }

        match self.deliver(submission).await {
            Ok(()) => self.submissions.mark_sent(submission.id).await,
            Err(error) => {
                self.submissions.release(submission.id).await?;
                Err(error)
            }
        }
    }

    async fn deliver(&self, submission: &Submission) -> Result<()> {
        let message = self
            .content
            .message(submission.message_id())
            .await?
            .ok_or_else(|| Error::not_found("Message", submission.message_id()))?;
        let newsletter = self.newsletter(submission.newsletter_id()).await?;

        // Snapshot members who unsubscribed since build time are dropped
        // here, as a courtesy to late unsubscribes
        let recipients = self
            .recipients
            .subscribed_among(&submission.recipients)
            .await?;

        tracing::info!(
            "Submitting {} to {} recipients",
            message.title,
            recipients.len()
        );

        let templates = self.templates.resolve(Action::Message, &newsletter.slug)?;

        let batch_size = self
            .config
            .batch_size
            .map(NonZeroUsize::get)
            .unwrap_or_else(|| recipients.len().max(1));

        for (batch_index, batch) in recipients.chunks(batch_size).enumerate() {
            if batch_index > 0 && !self.config.batch_delay.is_zero() {
                tokio::time::sleep(self.config.batch_delay).await;
            }

            for (offset, subscription) in batch.iter().enumerate() {
                if offset > 0 && !self.config.email_delay.is_zero() {
                    tokio::time::sleep(self.config.email_delay).await;
                }

                if let Err(error) = self
                    .send_message(subscription, &newsletter, &message, submission, templates)
                    .await
                {
                    tracing::error!(
                        error = %error,
                        subscription = %subscription.id,
                        "Message to subscriber failed; continuing"
                    );
                }
            }
        }
        Ok(())
    }

    async fn send_message(
        &self,
        subscription: &Subscription,
        newsletter: &Newsletter,
        message: &Message,
        submission: &Submission,
        templates: &ActionTemplates,
    ) -> Result<()> {
        let unsubscribe_url =
            subscription.unsubscribe_activate_url(&self.site, &newsletter.slug)?;

        let context = template::message_context(
            subscription,
            newsletter,
            message,
            submission,
            &self.site,
            &unsubscribe_url,
        );
        let rendered = templates.render(&context, newsletter.send_html)?;

        let email = OutgoingEmail {
            to: subscription.recipient_line()?,
            from: newsletter.sender_line(),
            subject: rendered.subject,
            text_body: rendered.text,
            html_body: rendered.html,
            headers: vec![("List-Unsubscribe".to_string(), unsubscribe_url.to_string())],
        };

        tracing::debug!("Submitting message to {}", email.to);
        self.transport.send(&email).await
    }

    /// Send a subscribe/unsubscribe/update confirmation e-mail, rendered
    /// with that action's templates and carrying the matching activation
    /// URL.
    #[tracing::instrument(name = "Send activation email", skip(self, subscription), fields(subscription = %subscription.id))]
    pub async fn send_activation_email(
        &self,
        subscription: &Subscription,
        action: Action,
    ) -> Result<()> {
        let newsletter = self.newsletter(subscription.newsletter_id).await?;

        let unsubscribe_url =
            subscription.unsubscribe_activate_url(&self.site, &newsletter.slug)?;
        let activation_url = match action {
            Action::Subscribe => {
                subscription.subscribe_activate_url(&self.site, &newsletter.slug)?
            }
            Action::Unsubscribe => unsubscribe_url.clone(),
            Action::Update => subscription.update_activate_url(&self.site, &newsletter.slug)?,
            Action::Message => {
                return Err(Error::Inconsistency(
                    "Activation e-mails exist for subscribe/unsubscribe/update only".into(),
                ))
            }
        };

        let templates = self.templates.resolve(action, &newsletter.slug)?;
        let context = template::activation_context(
            subscription,
            &newsletter,
            &self.site,
            &unsubscribe_url,
            &activation_url,
        );
        let rendered = templates.render(&context, newsletter.send_html)?;

        let email = OutgoingEmail {
            to: subscription.recipient_line()?,
            from: newsletter.sender_line(),
            subject: rendered.subject,
            text_body: rendered.text,
            html_body: rendered.html,
            headers: Vec::new(),
        };

        self.transport.send(&email).await?;

        tracing::debug!(
            "Activation email sent for action {} with code {}",
            action,
            subscription.activation_code
        );
        Ok(())
    }

    async fn newsletter(&self, id: Uuid) -> Result<Newsletter> {
        self.content
            .newsletter(id)
            .await?
            .ok_or_else(|| Error::not_found("Newsletter", id))
    }
}
