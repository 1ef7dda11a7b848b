mod message;
mod newsletter;
mod submission;
mod subscription;

pub use message::{Article, Message};
pub use newsletter::{Newsletter, Site};
pub use submission::Submission;
pub use subscription::{Subscription, SubscriptionStatus, UserRef};
