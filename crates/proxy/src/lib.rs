pub mod endpoint;
pub mod ledger;
pub mod pool;

pub use endpoint::{ProxyEndpoint, ProxyVariant};
pub use ledger::{JsonLedgerStore, UsageLedger};
pub use pool::{PoolStatistics, ProxyRotation, VariantStatistics};
