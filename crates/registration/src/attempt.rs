use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

/// Pipeline position of a registration attempt. Each stage requires its
/// action to succeed before the attempt advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    AddressCreated,
    ContextReady,
    FormSubmitted,
    LinkObtained,
    Verified,
    CredentialPersisted,
    Done,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Init => "Init",
            Stage::AddressCreated => "AddressCreated",
            Stage::ContextReady => "ContextReady",
            Stage::FormSubmitted => "FormSubmitted",
            Stage::LinkObtained => "LinkObtained",
            Stage::Verified => "Verified",
            Stage::CredentialPersisted => "CredentialPersisted",
            Stage::Done => "Done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How an attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    Failed { stage: Stage, reason: String },
    Cancelled,
}

impl AttemptOutcome {
    pub fn failed(stage: Stage, reason: impl ToString) -> Self {
        AttemptOutcome::Failed {
            stage,
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StageStamp {
    pub stage: Stage,
    pub at: DateTime<Utc>,
}

/// One attempt's record: current stage, per-stage timestamps, terminal
/// outcome. Only the orchestrator mutates it, and once terminal it stays
/// frozen.
#[derive(Debug)]
pub struct RegistrationAttempt {
    pub id: String,
    stage: Stage,
    history: Vec<StageStamp>,
    outcome: Option<AttemptOutcome>,
}

impl RegistrationAttempt {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            stage: Stage::Init,
            history: vec![StageStamp {
                stage: Stage::Init,
                at: Utc::now(),
            }],
            outcome: None,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn history(&self) -> &[StageStamp] {
        &self.history
    }

    pub fn outcome(&self) -> Option<&AttemptOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn advance(&mut self, stage: Stage) {
        if self.is_terminal() {
            return;
        }
        debug!(id = %self.id, from = %self.stage, to = %stage, "attempt advanced");
        self.stage = stage;
        self.history.push(StageStamp {
            stage,
            at: Utc::now(),
        });
    }

    pub fn finish(&mut self, outcome: AttemptOutcome) {
        if self.is_terminal() {
            return;
        }
        self.outcome = Some(outcome);
    }
}

/// External abort signal, checked at stage boundaries only.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
