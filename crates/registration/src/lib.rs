pub mod attempt;
pub mod batch;
pub mod credentials;
pub mod orchestrator;

pub use attempt::{AttemptOutcome, CancelFlag, RegistrationAttempt, Stage, StageStamp};
pub use batch::{BatchConfig, BatchDriver, BatchStats, FailureRecord};
pub use credentials::{CredentialVariant, SessionCredential};
pub use orchestrator::{EngineConfig, RegisterEngine};
