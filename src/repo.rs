mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;

use chrono::{DateTime, Utc};

use uuid::Uuid;

use crate::error::Result;
use crate::model::{Message, Newsletter, Submission, Subscription};

/// Read access to newsletters and messages.
///
/// The delivery engine only ever reads content; ownership stays with the
/// editorial tooling outside this crate.
///
/// NOTE: Store traits are object safe to facilitate easier testing/mocking
/// TODO: Swap async-trait for std async traits when those become stable
/// https://github.com/orgs/rust-lang/projects/28/views/2?pane=issue&itemId=21990165
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn newsletter(&self, id: Uuid) -> Result<Option<Newsletter>>;

    async fn message(&self, id: Uuid) -> Result<Option<Message>>;
}

/// Persistence of subscription records. Sole owner of subscriber data.
#[async_trait]
pub trait RecipientStore: Send + Sync {
    /// Insert or update a subscription.
    ///
    /// Validates the identity invariant (exactly one of linked user / raw
    /// e-mail) and (newsletter, resolved e-mail) uniqueness before any
    /// write.
    async fn save(&self, subscription: &Subscription) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<Subscription>>;

    /// All currently subscribed recipients of a newsletter, in stable order
    async fn subscribed_for(&self, newsletter_id: Uuid) -> Result<Vec<Subscription>>;

    /// The subset of `ids` that is currently subscribed, in stable order
    async fn subscribed_among(&self, ids: &[Uuid]) -> Result<Vec<Subscription>>;
}

/// Persistence of submissions and their recipient snapshots.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Insert a new submission.
    ///
    /// The newsletter reference is re-derived from the message and at most
    /// one publishable submission may exist per message.
    async fn insert(&self, submission: &Submission) -> Result<()>;

    /// Update an existing submission, under the same rules as `insert`
    async fn save(&self, submission: &Submission) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<Submission>>;

    /// Replace the frozen recipient snapshot
    async fn set_recipients(&self, id: Uuid, recipients: &[Uuid]) -> Result<()>;

    /// Submissions due for delivery: prepared, unsent, not currently
    /// sending, publish date strictly in the past
    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<Submission>>;

    /// Atomically take the sending flag for a delivery pass.
    ///
    /// Compare-and-set: succeeds only while the submission is prepared,
    /// unsent and not already sending. Returns whether the claim was won;
    /// a lost claim means another scheduler pass holds the submission.
    async fn claim(&self, id: Uuid) -> Result<bool>;

    /// Roll back a claim after a fatal delivery error, leaving the
    /// submission eligible for a future pass
    async fn release(&self, id: Uuid) -> Result<()>;

    /// Complete a delivery pass: clear sending and set sent in one step
    async fn mark_sent(&self, id: Uuid) -> Result<()>;
}
