pub mod forwarding;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub use forwarding::ForwardingRuleClient;

/// A one-shot receiving address, scoped to a single registration attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisposableAddress {
    pub local_part: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("address provider rejected request: {0}")]
    Api(String),

    #[error("address provider transport: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("address provider returned malformed payload: {0}")]
    Malformed(String),
}

/// Boundary to the disposable-address backend. The orchestrator treats any
/// error here as an immediate, unretried stage failure.
#[async_trait]
pub trait AddressProvider: Send + Sync {
    async fn create(&self, label: &str) -> Result<DisposableAddress, ProviderError>;
}
