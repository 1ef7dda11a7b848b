mod email_client;
mod memory;

pub use email_client::{EmailAuthorizationToken, EmailClient};
pub use memory::MemoryTransport;

use async_trait::async_trait;

use crate::error::Result;

/// A fully composed outgoing e-mail, ready for a transport
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    /// Recipient line, e.g. `Test Name <test@test.com>`
    pub to: String,
    /// Sender line, e.g. `Test Sender <test@testsender.com>`
    pub from: String,
    pub subject: String,
    pub text_body: String,
    /// Optional HTML alternative
    pub html_body: Option<String>,
    /// Extra message headers, e.g. `List-Unsubscribe`
    pub headers: Vec<(String, String)>,
}

impl OutgoingEmail {
    /// Look up a header value by name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Mail delivery seam.
///
/// Implemented by the HTTP [`EmailClient`] for production and by
/// [`MemoryTransport`] for tests; a failed send surfaces as an error and is
/// the caller's to isolate.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<()>;
}
