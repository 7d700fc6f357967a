use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::{MailError, MailMessage, Mailbox, MailboxSession};

/// HTTP mail-gateway client for the shared inbox all disposable addresses
/// forward into. Every `open` builds a fresh connection so a polling round
/// sees the current mailbox state rather than a cached listing.
pub struct GatewayMailbox {
    base_url: String,
    mailbox: String,
    access_token: String,
    request_timeout: Duration,
}

pub struct GatewaySession {
    http: reqwest::Client,
    messages_url: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GatewayMessage {
    #[serde(default)]
    to: String,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    parts: Vec<GatewayPart>,
}

#[derive(Debug, Deserialize)]
struct GatewayPart {
    content_type: String,
    body: String,
}

impl GatewayMailbox {
    pub fn new(
        base_url: impl Into<String>,
        mailbox: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            mailbox: mailbox.into(),
            access_token: access_token.into(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[async_trait]
impl Mailbox for GatewayMailbox {
    async fn open(&self) -> Result<Box<dyn MailboxSession>, MailError> {
        let http = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()?;

        let messages_url = format!(
            "{}/mailboxes/{}/messages",
            self.base_url.trim_end_matches('/'),
            self.mailbox
        );

        debug!(mailbox = %self.mailbox, "opened mailbox session");
        Ok(Box::new(GatewaySession {
            http,
            messages_url,
            access_token: self.access_token.clone(),
        }))
    }
}

#[async_trait]
impl MailboxSession for GatewaySession {
    async fn list_recent(&mut self, n: usize) -> Result<Vec<MailMessage>, MailError> {
        let response = self
            .http
            .get(&self.messages_url)
            .query(&[("limit", n.to_string()), ("order", "newest".to_string())])
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MailError::Gateway(format!(
                "message listing failed: HTTP {}",
                response.status()
            )));
        }

        let raw: Vec<GatewayMessage> = response.json().await?;
        Ok(raw.into_iter().map(into_message).collect())
    }

    async fn close(&mut self) {
        // Connections are per-session; dropping the client is the close.
        debug!("closed mailbox session");
    }
}

fn into_message(raw: GatewayMessage) -> MailMessage {
    let html_parts = raw
        .parts
        .into_iter()
        .filter(|p| p.content_type.starts_with("text/html"))
        .map(|p| p.body)
        .collect();

    MailMessage {
        to: raw.to,
        subject: raw.subject,
        html_parts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_html_parts_are_kept() {
        let raw: GatewayMessage = serde_json::from_str(
            r#"{
                "to": "a@b.c",
                "subject": "hi",
                "parts": [
                    { "content_type": "text/plain", "body": "plain" },
                    { "content_type": "text/html; charset=utf-8", "body": "<p>html</p>" }
                ]
            }"#,
        )
        .unwrap();

        let msg = into_message(raw);
        assert_eq!(msg.html_parts, vec!["<p>html</p>".to_string()]);
    }
}
