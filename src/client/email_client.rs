use std::convert::Infallible;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

use async_trait::async_trait;

use reqwest::Client;

use serde::Serialize;

use secrecy::Secret;

use url::Url;

use crate::error::Result;

use super::{MailTransport, OutgoingEmail};

const POSTMARK_TOKEN_HEADER: &str = "X-Postmark-Server-Token";

/// Mail transport talking to a Postmark-style HTTP send API
#[derive(Debug)]
pub struct EmailClient {
    client: Client,

    api_send_email_url: Url,
    api_auth_token: EmailAuthorizationToken,
}

impl EmailClient {
    pub fn new(
        api_timeout: Duration,
        api_base_url: Url,
        api_auth_token: EmailAuthorizationToken,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(api_timeout)
            .build()
            .context("Failed to build http client")?;

        let api_send_email_url = api_base_url
            .join("email")
            .context("Failed to create send email endpoint URL")?;

        Ok(Self {
            client,
            api_send_email_url,
            api_auth_token,
        })
    }
}

#[async_trait]
impl MailTransport for EmailClient {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        use secrecy::ExposeSecret;

        let headers: Vec<HeaderRequest> = email
            .headers
            .iter()
            .map(|(name, value)| HeaderRequest { name, value })
            .collect();

        let body = SendEmailRequest {
            to: &email.to,
            from: &email.from,
            subject: &email.subject,
            text_body: &email.text_body,
            html_body: email.html_body.as_deref(),
            headers,
        };

        self.client
            .post(self.api_send_email_url.clone())
            .header(POSTMARK_TOKEN_HEADER, self.api_auth_token.expose_secret())
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct EmailAuthorizationToken(Secret<String>);

impl FromStr for EmailAuthorizationToken {
    type Err = Infallible;

    fn from_str(value: &str) -> std::result::Result<Self, Infallible> {
        let value = value.to_string();
        let value = Secret::new(value);

        Ok(Self(value))
    }
}

impl From<Secret<String>> for EmailAuthorizationToken {
    fn from(value: Secret<String>) -> Self {
        Self(value)
    }
}

impl secrecy::ExposeSecret<String> for EmailAuthorizationToken {
    fn expose_secret(&self) -> &String {
        self.0.expose_secret()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct SendEmailRequest<'a> {
    to: &'a str,
    from: &'a str,
    subject: &'a str,
    text_body: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    html_body: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    headers: Vec<HeaderRequest<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct HeaderRequest<'a> {
    name: &'a str,
    value: &'a str,
}
