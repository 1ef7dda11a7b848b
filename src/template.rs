use std::fmt;

use chrono::{DateTime, Utc};

use serde::Serialize;

use tera::{Context, Tera};

use url::Url;

use crate::error::{Error, Result};
use crate::model::{Message, Newsletter, Site, Submission, Subscription};

/// The e-mail kinds the engine can render: the three activation actions plus
/// the newsletter message itself. Template lookup is an explicit table keyed
/// by this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Subscribe,
    Unsubscribe,
    Update,
    Message,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::Update => "update",
            Self::Message => "message",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The subject/text/HTML template sources for one action
#[derive(Debug, Clone)]
pub struct ActionTemplates {
    pub subject: String,
    pub text: String,
    pub html: Option<String>,
}

impl ActionTemplates {
    pub fn new(subject: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            text: text.into(),
            html: None,
        }
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    /// Render all parts against `context`.
    ///
    /// Subject and text render unescaped and the subject is trimmed; the
    /// HTML part renders escaped and only when the newsletter sends HTML.
    pub fn render(&self, context: &Context, send_html: bool) -> Result<RenderedMessage> {
        let subject = Tera::one_off(&self.subject, context, false)?
            .trim()
            .to_string();
        let text = Tera::one_off(&self.text, context, false)?;

        let html = match (&self.html, send_html) {
            (Some(template), true) => Some(Tera::one_off(template, context, true)?),
            _ => None,
        };

        Ok(RenderedMessage {
            subject,
            text,
            html,
        })
    }
}

/// A fully rendered e-mail body set
#[derive(Debug, Clone)]
pub struct RenderedMessage {
    pub subject: String,
    pub text: String,
    pub html: Option<String>,
}

#[derive(Debug)]
struct TemplateEntry {
    action: Action,
    /// Newsletter slug this entry overrides for; `None` marks a default
    newsletter: Option<String>,
    templates: ActionTemplates,
}

/// Lookup table for e-mail templates.
///
/// Resolution prefers a newsletter-scoped override, then falls back to the
/// single default entry for the action. Zero or multiple defaults is a
/// configuration error, never a guess.
#[derive(Debug, Default)]
pub struct TemplateStore {
    entries: Vec<TemplateEntry>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in template set: plain defaults for all four actions
    pub fn builtin() -> Self {
        Self::new()
            .with_default(
                Action::Subscribe,
                ActionTemplates::new(
                    defaults::SUBSCRIBE_SUBJECT,
                    defaults::SUBSCRIBE_TEXT,
                ),
            )
            .with_default(
                Action::Unsubscribe,
                ActionTemplates::new(
                    defaults::UNSUBSCRIBE_SUBJECT,
                    defaults::UNSUBSCRIBE_TEXT,
                ),
            )
            .with_default(
                Action::Update,
                ActionTemplates::new(defaults::UPDATE_SUBJECT, defaults::UPDATE_TEXT),
            )
            .with_default(
                Action::Message,
                ActionTemplates::new(defaults::MESSAGE_SUBJECT, defaults::MESSAGE_TEXT)
                    .with_html(defaults::MESSAGE_HTML),
            )
    }

    pub fn with_default(mut self, action: Action, templates: ActionTemplates) -> Self {
        self.entries.push(TemplateEntry {
            action,
            newsletter: None,
            templates,
        });
        self
    }

    pub fn with_override(
        mut self,
        newsletter_slug: impl Into<String>,
        action: Action,
        templates: ActionTemplates,
    ) -> Self {
        self.entries.push(TemplateEntry {
            action,
            newsletter: Some(newsletter_slug.into()),
            templates,
        });
        self
    }

    /// Resolve the template set for `action`, scoped to a newsletter
    pub fn resolve(&self, action: Action, newsletter_slug: &str) -> Result<&ActionTemplates> {
        if let Some(entry) = self
            .entries
            .iter()
            .find(|e| e.action == action && e.newsletter.as_deref() == Some(newsletter_slug))
        {
            return Ok(&entry.templates);
        }

        let mut defaults = self
            .entries
            .iter()
            .filter(|e| e.action == action && e.newsletter.is_none());

        match (defaults.next(), defaults.next()) {
            (Some(entry), None) => Ok(&entry.templates),
            (None, _) => Err(Error::Config(format!(
                "No default template configured for action {}",
                action
            ))),
            (Some(_), Some(_)) => Err(Error::Config(format!(
                "Multiple default templates configured for action {}",
                action
            ))),
        }
    }
}

#[derive(Debug, Serialize)]
struct SubscriptionView<'a> {
    name: Option<&'a str>,
    email: Option<&'a str>,
    activation_code: &'a str,
}

impl<'a> SubscriptionView<'a> {
    fn from(subscription: &'a Subscription) -> Self {
        Self {
            name: subscription.name(),
            email: subscription.email().map(AsRef::as_ref),
            activation_code: subscription.activation_code.as_ref(),
        }
    }
}

#[derive(Debug, Serialize)]
struct NewsletterView<'a> {
    title: &'a str,
    slug: &'a str,
    sender: &'a str,
    email: &'a str,
}

impl<'a> NewsletterView<'a> {
    fn from(newsletter: &'a Newsletter) -> Self {
        Self {
            title: &newsletter.title,
            slug: &newsletter.slug,
            sender: &newsletter.sender,
            email: newsletter.email.as_ref(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ArticleView<'a> {
    title: &'a str,
    text: &'a str,
    url: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct MessageView<'a> {
    title: &'a str,
    slug: &'a str,
    articles: Vec<ArticleView<'a>>,
}

impl<'a> MessageView<'a> {
    fn from(message: &'a Message) -> Self {
        Self {
            title: &message.title,
            slug: &message.slug,
            articles: message
                .articles()
                .iter()
                .map(|a| ArticleView {
                    title: &a.title,
                    text: &a.text,
                    url: a.url.as_ref().map(Url::as_str),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SiteView<'a> {
    domain: &'a str,
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct SubmissionView {
    publish_date: DateTime<Utc>,
}

fn base_context(
    subscription: &Subscription,
    newsletter: &Newsletter,
    site: &Site,
    unsubscribe_url: &Url,
) -> Context {
    let mut context = Context::new();
    context.insert("subscription", &SubscriptionView::from(subscription));
    context.insert("newsletter", &NewsletterView::from(newsletter));
    context.insert(
        "site",
        &SiteView {
            domain: &site.domain,
            name: &site.name,
        },
    );
    context.insert("unsubscribe_url", unsubscribe_url.as_str());
    context
}

/// Render context for one recipient of a newsletter message
pub fn message_context(
    subscription: &Subscription,
    newsletter: &Newsletter,
    message: &Message,
    submission: &Submission,
    site: &Site,
    unsubscribe_url: &Url,
) -> Context {
    let mut context = base_context(subscription, newsletter, site, unsubscribe_url);
    context.insert("message", &MessageView::from(message));
    context.insert(
        "submission",
        &SubmissionView {
            publish_date: submission.publish_date,
        },
    );
    context.insert("date", &submission.publish_date);
    context
}

/// Render context for an activation e-mail (subscribe/unsubscribe/update)
pub fn activation_context(
    subscription: &Subscription,
    newsletter: &Newsletter,
    site: &Site,
    unsubscribe_url: &Url,
    activation_url: &Url,
) -> Context {
    let mut context = base_context(subscription, newsletter, site, unsubscribe_url);
    context.insert("activation_url", activation_url.as_str());
    context.insert("date", &Utc::now());
    context
}

mod defaults {
    pub const SUBSCRIBE_SUBJECT: &str = "Confirm your subscription to {{ newsletter.title }}";
    pub const SUBSCRIBE_TEXT: &str = "\
Hello{% if subscription.name %} {{ subscription.name }}{% endif %},

You, or someone in your name, requested a subscription to {{ newsletter.title }}.

To confirm, please follow this activation link:
{{ activation_url }}

If this was not you, simply ignore this message.
";

    pub const UNSUBSCRIBE_SUBJECT: &str = "Unsubscribe from {{ newsletter.title }}";
    pub const UNSUBSCRIBE_TEXT: &str = "\
Hello{% if subscription.name %} {{ subscription.name }}{% endif %},

To confirm you no longer wish to receive {{ newsletter.title }}, please
follow this link:
{{ activation_url }}
";

    pub const UPDATE_SUBJECT: &str = "Update your subscription to {{ newsletter.title }}";
    pub const UPDATE_TEXT: &str = "\
Hello{% if subscription.name %} {{ subscription.name }}{% endif %},

To update your subscription to {{ newsletter.title }}, please follow this
link:
{{ activation_url }}
";

    pub const MESSAGE_SUBJECT: &str = "{{ newsletter.title }}: {{ message.title }}";
    pub const MESSAGE_TEXT: &str = "\
{{ message.title }}
{% for article in message.articles %}
{{ article.title }}

{{ article.text }}
{% if article.url %}Read more: {{ article.url }}{% endif %}
{% endfor %}
--
You receive this message because you are subscribed to {{ newsletter.title }}.
Unsubscribe: {{ unsubscribe_url }}
";
    pub const MESSAGE_HTML: &str = "\
<h1>{{ message.title }}</h1>
{% for article in message.articles %}
<h2>{{ article.title }}</h2>
<p>{{ article.text }}</p>
{% if article.url %}<p><a href=\"{{ article.url }}\">Read more</a></p>{% endif %}
{% endfor %}
<hr>
<p>You receive this message because you are subscribed to
{{ newsletter.title }}. <a href=\"{{ unsubscribe_url }}\">Unsubscribe</a>.</p>
";
}
