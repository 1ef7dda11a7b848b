use std::net::IpAddr;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use url::Url;

use uuid::Uuid;

use crate::domain::{ActivationCode, EmailAddress, PersonName};
use crate::error::{Error, Result};

use super::Site;

/// A linked user account, resolved to the fields the engine needs.
/// Account management itself lives outside this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRef {
    pub id: Uuid,
    pub name: String,
    pub email: EmailAddress,
}

/// Activation state of a subscription.
///
/// A subscription starts out `Pending` (requested, never activated) and moves
/// between `Subscribed` and `Unsubscribed` through the transition methods on
/// [`Subscription`], which stamp the matching timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Pending,
    Subscribed,
    Unsubscribed,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Subscribed => "subscribed",
            Self::Unsubscribed => "unsubscribed",
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "pending" => Ok(Self::Pending),
            "subscribed" => Ok(Self::Subscribed),
            "unsubscribed" => Ok(Self::Unsubscribed),
            other => Err(Error::Parsing(format!(
                "{} is not a valid subscription status",
                other
            ))),
        }
    }
}

/// A recipient's relationship to one newsletter.
///
/// Identity comes from exactly one of two sources: a linked user account or a
/// raw name/e-mail pair. [`Subscription::validate`] rejects records with
/// neither or both; stores run it before any write.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: Uuid,
    pub newsletter_id: Uuid,
    /// Linked account; mutually exclusive with `email`
    pub user: Option<UserRef>,
    pub name: Option<PersonName>,
    pub email: Option<EmailAddress>,
    /// Originating IP of the subscription request, when known
    pub ip: Option<IpAddr>,
    pub create_date: DateTime<Utc>,
    pub activation_code: ActivationCode,
    pub(crate) status: SubscriptionStatus,
    pub(crate) subscribe_date: Option<DateTime<Utc>>,
    pub(crate) unsubscribe_date: Option<DateTime<Utc>>,
}

impl Subscription {
    /// A fresh, never-activated subscription for a raw e-mail address
    pub fn new(newsletter_id: Uuid, name: Option<PersonName>, email: EmailAddress) -> Self {
        Self {
            id: Uuid::new_v4(),
            newsletter_id,
            user: None,
            name,
            email: Some(email),
            ip: None,
            create_date: Utc::now(),
            activation_code: ActivationCode::generate(),
            status: SubscriptionStatus::Pending,
            subscribe_date: None,
            unsubscribe_date: None,
        }
    }

    /// A fresh, never-activated subscription for a linked user account
    pub fn for_user(newsletter_id: Uuid, user: UserRef) -> Self {
        Self {
            id: Uuid::new_v4(),
            newsletter_id,
            user: Some(user),
            name: None,
            email: None,
            ip: None,
            create_date: Utc::now(),
            activation_code: ActivationCode::generate(),
            status: SubscriptionStatus::Pending,
            subscribe_date: None,
            unsubscribe_date: None,
        }
    }

    pub fn status(&self) -> SubscriptionStatus {
        self.status
    }

    pub fn is_subscribed(&self) -> bool {
        self.status == SubscriptionStatus::Subscribed
    }

    pub fn is_unsubscribed(&self) -> bool {
        self.status == SubscriptionStatus::Unsubscribed
    }

    /// When the subscription last became active
    pub fn subscribe_date(&self) -> Option<DateTime<Utc>> {
        self.subscribe_date
    }

    /// When the subscription last became inactive
    pub fn unsubscribe_date(&self) -> Option<DateTime<Utc>> {
        self.unsubscribe_date
    }

    /// Activate the subscription, stamping the subscribe date.
    ///
    /// Always legal; re-activating an already active subscription restamps
    /// the date, tracking the most recent (re)activation.
    pub fn subscribe(&mut self) {
        self.subscribe_at(Utc::now());
    }

    pub fn subscribe_at(&mut self, at: DateTime<Utc>) {
        tracing::debug!(subscription = %self.id, "Subscribing");

        self.status = SubscriptionStatus::Subscribed;
        self.subscribe_date = Some(at);
    }

    /// Deactivate the subscription, stamping the unsubscribe date.
    pub fn unsubscribe(&mut self) {
        self.unsubscribe_at(Utc::now());
    }

    pub fn unsubscribe_at(&mut self, at: DateTime<Utc>) {
        tracing::debug!(subscription = %self.id, "Unsubscribing");

        self.status = SubscriptionStatus::Unsubscribed;
        self.unsubscribe_date = Some(at);
    }

    /// Display name, resolved through the linked account first
    pub fn name(&self) -> Option<&str> {
        if let Some(user) = &self.user {
            return Some(&user.name);
        }
        self.name.as_ref().map(AsRef::as_ref)
    }

    /// E-mail address, resolved through the linked account first
    pub fn email(&self) -> Option<&EmailAddress> {
        if let Some(user) = &self.user {
            return Some(&user.email);
        }
        self.email.as_ref()
    }

    /// The To line for outgoing mail: `Name <addr>`, or the bare address
    /// when no name is known
    pub fn recipient_line(&self) -> Result<String> {
        let email = self.email().ok_or_else(|| {
            Error::Validation("Subscription has no e-mail address".into())
        })?;

        match self.name() {
            Some(name) => Ok(format!("{} <{}>", name, email)),
            None => Ok(email.to_string()),
        }
    }

    /// Check the identity invariant: exactly one of linked account or raw
    /// e-mail must be set
    pub fn validate(&self) -> Result<()> {
        match (&self.user, &self.email) {
            (None, None) => Err(Error::Validation(
                "Neither an e-mail nor a user is set. This asks for inconsistency!".into(),
            )),
            (Some(_), Some(_)) => Err(Error::Validation(
                "If a user is set, e-mail must be empty and vice versa.".into(),
            )),
            _ => Ok(()),
        }
    }

    /// The URL a recipient visits to activate their subscription
    pub fn subscribe_activate_url(&self, site: &Site, newsletter_slug: &str) -> Result<Url> {
        self.activate_url(site, newsletter_slug, "subscribe")
    }

    /// The URL a recipient visits to unsubscribe without logging in,
    /// authorized by the activation code. Sent as the `List-Unsubscribe`
    /// header on every newsletter e-mail.
    pub fn unsubscribe_activate_url(&self, site: &Site, newsletter_slug: &str) -> Result<Url> {
        self.activate_url(site, newsletter_slug, "unsubscribe")
    }

    /// The URL a recipient visits to update their subscription details
    pub fn update_activate_url(&self, site: &Site, newsletter_slug: &str) -> Result<Url> {
        self.activate_url(site, newsletter_slug, "update")
    }

    fn activate_url(&self, site: &Site, newsletter_slug: &str, action: &str) -> Result<Url> {
        let email = self.email().ok_or_else(|| {
            Error::Validation("Subscription has no e-mail address".into())
        })?;

        site.page_url(&format!(
            "newsletter/{}/subscription/{}/{}/activate/{}/",
            newsletter_slug, email, action, self.activation_code
        ))
    }
}
