use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use regforge_core::retry::{BackoffPolicy, RetryOutcome};

use crate::{extract, Mailbox};

/// Polling came up empty within its attempt bound. A typed result, not an
/// exception: callers branch on it like any other stage outcome.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PollError {
    #[error("no confirmation message after {attempts} polling attempts")]
    ThresholdExceeded { attempts: u32 },
}

/// Sweeps the shared inbox for the confirmation message addressed to one
/// disposable address and pulls the confirmation link out of it.
pub struct InboxPoller<'a> {
    mailbox: &'a dyn Mailbox,
    recent_count: usize,
    subject_marker: String,
    link_prefix: String,
}

impl<'a> InboxPoller<'a> {
    pub fn new(
        mailbox: &'a dyn Mailbox,
        recent_count: usize,
        subject_marker: impl Into<String>,
        link_prefix: impl Into<String>,
    ) -> Self {
        Self {
            mailbox,
            recent_count,
            subject_marker: subject_marker.into(),
            link_prefix: link_prefix.into(),
        }
    }

    /// Run up to `max_attempts` sweeps, `interval` apart, each against a
    /// fresh mailbox session. Returns the first confirmation link found.
    pub async fn poll(
        &self,
        address: &str,
        max_attempts: u32,
        interval: Duration,
    ) -> Result<String, PollError> {
        let policy = BackoffPolicy::attempts(max_attempts, interval);

        let outcome = policy
            .run(|attempt| {
                debug!(attempt, max_attempts, address = %address, "inbox sweep");
                self.sweep(address)
            })
            .await;

        match outcome {
            RetryOutcome::Completed { value, attempts } => {
                info!(attempts, link = %value, "confirmation link found");
                Ok(value)
            }
            RetryOutcome::Exhausted { attempts } => {
                warn!(attempts, address = %address, "polling threshold reached");
                Err(PollError::ThresholdExceeded { attempts })
            }
        }
    }

    /// One sweep: fresh session, newest messages first, first match wins.
    /// A message addressed to us whose subject lacks the marker is seen
    /// but not ours; the sweep keeps going through older messages.
    async fn sweep(&self, address: &str) -> Option<String> {
        let mut session = match self.mailbox.open().await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "mailbox open failed, counting the attempt");
                return None;
            }
        };

        let messages = match session.list_recent(self.recent_count).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(error = %e, "message listing failed");
                session.close().await;
                return None;
            }
        };

        let mut seen_recipient = false;

        for message in &messages {
            if !message.addressed_to(address) {
                continue;
            }
            seen_recipient = true;

            if !message.subject_contains(&self.subject_marker) {
                debug!(subject = %message.subject, "recipient matches but subject lacks marker");
                continue;
            }

            if let Some(link) = extract::first_link_with_prefix(&message.html_parts, &self.link_prefix)
            {
                session.close().await;
                return Some(link);
            }
            debug!("matching message carries no link with the configured prefix");
        }

        if seen_recipient {
            debug!(address = %address, "messages for recipient present, none confirmable yet");
        } else {
            debug!(address = %address, "no messages for recipient in this sweep");
        }

        session.close().await;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MailError, MailMessage, MailboxSession};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct FixedMailbox {
        messages: Vec<MailMessage>,
        opens: Arc<AtomicU32>,
        closes: Arc<AtomicU32>,
    }

    struct FixedSession {
        messages: Vec<MailMessage>,
        closes: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Mailbox for FixedMailbox {
        async fn open(&self) -> Result<Box<dyn MailboxSession>, MailError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FixedSession {
                messages: self.messages.clone(),
                closes: Arc::clone(&self.closes),
            }))
        }
    }

    #[async_trait]
    impl MailboxSession for FixedSession {
        async fn list_recent(&mut self, n: usize) -> Result<Vec<MailMessage>, MailError> {
            Ok(self.messages.iter().take(n).cloned().collect())
        }

        async fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn mailbox(messages: Vec<MailMessage>) -> FixedMailbox {
        FixedMailbox {
            messages,
            opens: Arc::new(AtomicU32::new(0)),
            closes: Arc::new(AtomicU32::new(0)),
        }
    }

    const PREFIX: &str = "https://example.ai/magic-link#";
    const MARKER: &str = "log in to Example.ai";

    #[tokio::test]
    async fn finds_link_despite_recipient_case_mismatch() {
        let mb = mailbox(vec![MailMessage {
            to: "ABC123@Sub.Example.com".into(),
            subject: "Welcome — log in to Example.ai".into(),
            html_parts: vec![
                r##"<a href="https://example.ai/magic-link#tok123">go</a>"##.into(),
            ],
        }]);
        let poller = InboxPoller::new(&mb, 20, MARKER, PREFIX);

        let link = poller
            .poll("abc123@sub.example.com", 3, Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(link, "https://example.ai/magic-link#tok123");
        assert_eq!(mb.opens.load(Ordering::SeqCst), 1);
        assert_eq!(mb.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn threshold_reached_after_exactly_max_attempts() {
        let mb = mailbox(vec![MailMessage {
            to: "other@example.com".into(),
            subject: "unrelated".into(),
            html_parts: vec![],
        }]);
        let poller = InboxPoller::new(&mb, 20, MARKER, PREFIX);

        let err = poller
            .poll("abc@example.com", 3, Duration::from_millis(1))
            .await
            .unwrap_err();
        assert_eq!(err, PollError::ThresholdExceeded { attempts: 3 });
        // One fresh session per attempt, each closed.
        assert_eq!(mb.opens.load(Ordering::SeqCst), 3);
        assert_eq!(mb.closes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn seen_but_not_ours_does_not_stop_the_sweep() {
        // Newest message matches the recipient but not the subject; the
        // older one is the real confirmation.
        let mb = mailbox(vec![
            MailMessage {
                to: "abc@example.com".into(),
                subject: "Your weekly digest".into(),
                html_parts: vec![r#"<a href="https://example.ai/news">n</a>"#.into()],
            },
            MailMessage {
                to: "Someone <abc@example.com>".into(),
                subject: "Please log in to Example.ai now".into(),
                html_parts: vec![
                    r##"<a href="https://example.ai/magic-link#tok9">go</a>"##.into(),
                ],
            },
        ]);
        let poller = InboxPoller::new(&mb, 20, MARKER, PREFIX);

        let link = poller
            .poll("abc@example.com", 1, Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(link, "https://example.ai/magic-link#tok9");
    }

    #[tokio::test]
    async fn recent_count_limits_the_sweep() {
        let mut messages = vec![
            MailMessage {
                to: "noise@example.com".into(),
                subject: "noise".into(),
                html_parts: vec![],
            };
            5
        ];
        messages.push(MailMessage {
            to: "abc@example.com".into(),
            subject: MARKER.into(),
            html_parts: vec![r##"<a href="https://example.ai/magic-link#old">go</a>"##.into()],
        });
        let mb = mailbox(messages);

        // The confirmable message sits beyond the sweep window.
        let poller = InboxPoller::new(&mb, 5, MARKER, PREFIX);
        let err = poller
            .poll("abc@example.com", 2, Duration::from_millis(1))
            .await
            .unwrap_err();
        assert_eq!(err, PollError::ThresholdExceeded { attempts: 2 });
    }
}
