use url::Url;

use uuid::Uuid;

use crate::domain::EmailAddress;
use crate::error::{Error, Result};

/// The site a deployment serves mail for. Newsletter URLs (archive,
/// subscribe/unsubscribe pages) are rooted at its domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub domain: String,
    pub name: String,
}

impl Site {
    pub fn new(domain: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            name: name.into(),
        }
    }

    /// Absolute URL for a path under this site
    pub fn page_url(&self, path: &str) -> Result<Url> {
        Url::parse(&format!("http://{}/{}", self.domain, path))
            .map_err(|e| Error::Config(format!("Invalid site domain {}: {}", self.domain, e)))
    }
}

/// A named mailing list with its own sender identity and site scoping
#[derive(Debug, Clone)]
pub struct Newsletter {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    /// Sender display name
    pub sender: String,
    /// Sender e-mail address
    pub email: EmailAddress,
    /// Whether the newsletter is listed in the public archive
    pub visible: bool,
    /// Whether to render and attach HTML versions of e-mails
    pub send_html: bool,
    /// Site domains this newsletter is scoped to; empty means unrestricted
    pub sites: Vec<String>,
}

impl Newsletter {
    pub fn new(
        title: impl Into<String>,
        slug: impl Into<String>,
        sender: impl Into<String>,
        email: EmailAddress,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            slug: slug.into(),
            sender: sender.into(),
            email,
            visible: true,
            send_html: true,
            sites: Vec::new(),
        }
    }

    /// The From line for outgoing mail: `Sender Name <sender@example.com>`
    pub fn sender_line(&self) -> String {
        format!("{} <{}>", self.sender, self.email)
    }

    /// Whether submissions for this newsletter may be built for `site`
    pub fn serves(&self, site: &Site) -> bool {
        self.sites.is_empty() || self.sites.iter().any(|domain| domain == &site.domain)
    }

    pub fn subscribe_url(&self, site: &Site) -> Result<Url> {
        site.page_url(&format!("newsletter/{}/subscribe/", self.slug))
    }

    pub fn unsubscribe_url(&self, site: &Site) -> Result<Url> {
        site.page_url(&format!("newsletter/{}/unsubscribe/", self.slug))
    }

    pub fn update_url(&self, site: &Site) -> Result<Url> {
        site.page_url(&format!("newsletter/{}/update/", self.slug))
    }

    pub fn archive_url(&self, site: &Site) -> Result<Url> {
        site.page_url(&format!("newsletter/{}/archive/", self.slug))
    }
}
