use chrono::{DateTime, Utc};

use uuid::Uuid;

use super::Message;

/// One delivery campaign of a specific Message to a frozen recipient
/// snapshot.
///
/// The newsletter reference is always derived from the message and cannot be
/// set independently; stores re-derive it on every save as well, so a stale
/// value self-corrects.
///
/// Flag lifecycle: `prepare()` marks the submission ready for the queue;
/// the delivery engine flips `sending` for the duration of its pass and
/// `sent` on completion. `sending` and `sent` are never both true.
#[derive(Debug, Clone)]
pub struct Submission {
    pub id: Uuid,
    pub(crate) newsletter_id: Uuid,
    pub(crate) message_id: Uuid,
    /// Frozen recipient snapshot: subscription ids captured at build time
    pub recipients: Vec<Uuid>,
    /// When delivery is permitted to start
    pub publish_date: DateTime<Utc>,
    /// Whether the submission appears in the public archive
    pub publish: bool,
    pub(crate) prepared: bool,
    pub(crate) sent: bool,
    pub(crate) sending: bool,
}

impl Submission {
    /// A new submission for `message`, with no recipients yet
    pub fn for_message(message: &Message) -> Self {
        Self {
            id: Uuid::new_v4(),
            newsletter_id: message.newsletter_id,
            message_id: message.id,
            recipients: Vec::new(),
            publish_date: Utc::now(),
            publish: true,
            prepared: false,
            sent: false,
            sending: false,
        }
    }

    pub fn newsletter_id(&self) -> Uuid {
        self.newsletter_id
    }

    pub fn message_id(&self) -> Uuid {
        self.message_id
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    pub fn is_sent(&self) -> bool {
        self.sent
    }

    pub fn is_sending(&self) -> bool {
        self.sending
    }

    /// Mark the submission ready for queue processing.
    ///
    /// Returns whether anything changed: re-invoking on an already prepared
    /// or sent submission is a no-op reported back to the caller, not an
    /// error.
    pub fn prepare(&mut self) -> bool {
        if self.prepared || self.sent {
            return false;
        }
        self.prepared = true;
        true
    }
}
