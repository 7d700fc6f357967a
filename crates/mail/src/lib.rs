pub mod extract;
pub mod gateway;
pub mod message;
pub mod poller;

use async_trait::async_trait;
use thiserror::Error;

pub use gateway::GatewayMailbox;
pub use message::MailMessage;
pub use poller::{InboxPoller, PollError};

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mailbox transport: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("mailbox rejected request: {0}")]
    Gateway(String),
}

/// Mailbox-access boundary. `open` must hand back a session that sees the
/// current inbox state, not a cached view.
#[async_trait]
pub trait Mailbox: Send + Sync {
    async fn open(&self) -> Result<Box<dyn MailboxSession>, MailError>;
}

/// One live inbox view, owned by a single polling round.
#[async_trait]
pub trait MailboxSession: Send {
    /// The `n` most recent messages, newest first.
    async fn list_recent(&mut self, n: usize) -> Result<Vec<MailMessage>, MailError>;

    async fn close(&mut self);
}
