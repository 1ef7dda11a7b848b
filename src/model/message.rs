use chrono::{DateTime, Utc};

use url::Url;

use uuid::Uuid;

/// A single ordered section of a [`Message`]
#[derive(Debug, Clone)]
pub struct Article {
    /// Sort order determines the order in which articles are concatenated
    /// in a message
    pub sortorder: u32,
    pub title: String,
    pub text: String,
    pub url: Option<Url>,
}

/// Composed content belonging to one newsletter, sent through a Submission.
///
/// (newsletter, slug) pairs are unique; stores enforce this on insert.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub newsletter_id: Uuid,
    pub(crate) articles: Vec<Article>,
    pub date_create: DateTime<Utc>,
    pub date_modify: DateTime<Utc>,
}

impl Message {
    pub fn new(newsletter_id: Uuid, title: impl Into<String>, slug: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            slug: slug.into(),
            newsletter_id,
            articles: Vec::new(),
            date_create: now,
            date_modify: now,
        }
    }

    /// Articles in sort order
    pub fn articles(&self) -> &[Article] {
        &self.articles
    }

    /// Append an article at the next free sort position
    pub fn add_article(&mut self, title: impl Into<String>, text: impl Into<String>, url: Option<Url>) {
        let sortorder = self.next_sortorder();
        self.articles.push(Article {
            sortorder,
            title: title.into(),
            text: text.into(),
            url,
        });
        self.date_modify = Utc::now();
    }

    pub(crate) fn set_articles(&mut self, mut articles: Vec<Article>) {
        articles.sort_by_key(|a| a.sortorder);
        self.articles = articles;
    }

    /// Next available sort position, leaving gaps for manual reordering
    fn next_sortorder(&self) -> u32 {
        match self.articles.iter().map(|a| a.sortorder).max() {
            Some(max) => max + 10,
            None => 10,
        }
    }
}
