use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::attempt::{AttemptOutcome, CancelFlag, RegistrationAttempt, Stage};
use crate::orchestrator::RegisterEngine;

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub attempts: usize,
    pub max_concurrent: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            attempts: 1,
            max_concurrent: 1,
        }
    }
}

/// One failed attempt, kept for the batch summary.
#[derive(Debug, Clone)]
pub struct FailureRecord {
    pub attempt_id: String,
    pub stage: Stage,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct BatchStats {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub failures: Vec<FailureRecord>,
}

impl BatchStats {
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.succeeded as f64 / self.total as f64) * 100.0
        }
    }
}

/// Runs independent attempts under a concurrency cap. A failed attempt is
/// recorded and the batch moves on; only the shared cancellation signal
/// stops the remainder early.
pub struct BatchDriver {
    engine: Arc<RegisterEngine>,
    config: BatchConfig,
}

impl BatchDriver {
    pub fn new(engine: Arc<RegisterEngine>, config: BatchConfig) -> Self {
        Self { engine, config }
    }

    pub async fn run(&self, cancel: CancelFlag) -> BatchStats {
        info!(
            attempts = self.config.attempts,
            max_concurrent = self.config.max_concurrent,
            "starting registration batch"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));
        let mut handles = Vec::with_capacity(self.config.attempts);

        for i in 0..self.config.attempts {
            let engine = Arc::clone(&self.engine);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let id = format!("attempt-{:02}", i + 1);

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore never closed");
                engine.run(id, &cancel).await
            }));
        }

        let mut stats = BatchStats::default();
        for handle in handles {
            match handle.await {
                Ok(attempt) => record(&mut stats, attempt),
                Err(e) => error!(error = %e, "attempt task panicked"),
            }
        }

        info!(
            total = stats.total,
            succeeded = stats.succeeded,
            failed = stats.failed,
            cancelled = stats.cancelled,
            "registration batch finished"
        );
        stats
    }
}

fn record(stats: &mut BatchStats, attempt: RegistrationAttempt) {
    stats.total += 1;
    match attempt.outcome() {
        Some(AttemptOutcome::Succeeded) => stats.succeeded += 1,
        Some(AttemptOutcome::Failed { stage, reason }) => {
            warn!(id = %attempt.id, stage = %stage, reason = %reason, "attempt recorded as failed");
            stats.failed += 1;
            stats.failures.push(FailureRecord {
                attempt_id: attempt.id.clone(),
                stage: *stage,
                reason: reason.clone(),
            });
        }
        Some(AttemptOutcome::Cancelled) => stats.cancelled += 1,
        None => {
            warn!(id = %attempt.id, "attempt finished without terminal outcome");
            stats.failed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt_with(outcome: AttemptOutcome) -> RegistrationAttempt {
        let mut attempt = RegistrationAttempt::new("a");
        attempt.finish(outcome);
        attempt
    }

    #[test]
    fn record_tracks_each_outcome_kind() {
        let mut stats = BatchStats::default();
        record(&mut stats, attempt_with(AttemptOutcome::Succeeded));
        record(
            &mut stats,
            attempt_with(AttemptOutcome::failed(Stage::LinkObtained, "threshold")),
        );
        record(&mut stats, attempt_with(AttemptOutcome::Cancelled));

        assert_eq!(stats.total, 3);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.failures.len(), 1);
        assert_eq!(stats.failures[0].stage, Stage::LinkObtained);
        assert!((stats.success_rate() - 33.3).abs() < 0.1);
    }
}
